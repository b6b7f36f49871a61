use crate::GiFrame;

/// Algorithm producing the view's diffuse indirect lighting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GiBackend {
    /// Plain path tracing, no reuse; a reference for the others.
    BruteForce,

    #[default]
    Restir,

    Ddgi,
    Surfel,
}

/// Per-call geometry features the kernels honor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GiFeatureFlags {
    /// Whether back faces of one-sided geometry get shaded instead of
    /// treated as black.
    pub two_sided_geometry: bool,

    /// Whether surfaces accept light through their back side.
    pub transmission: bool,

    pub hair: bool,
}

/// A GI algorithm, split into the stages every backend goes through.
///
/// Stages only record passes into [`GiFrame::graph`]; nothing gets computed
/// until the graph is executed.
pub trait GiStrategy {
    /// Produces fresh samples for this frame.
    fn generate_candidates(&mut self, frame: &mut GiFrame);

    /// Combines the fresh samples with whatever got cached so far (history,
    /// neighbors, probes, surfels).
    fn reuse(&mut self, frame: &mut GiFrame);

    /// Writes [`GiFrame::output`].
    fn evaluate(&mut self, frame: &mut GiFrame);

    fn record(&mut self, frame: &mut GiFrame) {
        self.generate_candidates(frame);
        self.reuse(frame);
        self.evaluate(frame);
    }
}
