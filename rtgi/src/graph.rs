//! Frame graph: resources live in arenas and are referenced through
//! generational handles, passes declare what they read and write and get
//! executed in submission order, with passes whose results nobody consumes
//! culled.

mod arena;
mod dispatch;

use std::any::Any;
use std::cell::{Ref, RefMut};
#[cfg(feature = "metrics")]
use std::time::{Duration, Instant};

use derivative::Derivative;
use fxhash::FxHashSet;
use log::{trace, warn};

pub use self::arena::*;
pub use self::dispatch::*;

type PassFn<'g> = Box<dyn FnOnce(&Resources<'_>) + 'g>;

#[derive(Derivative)]
#[derivative(Debug)]
struct Pass<'g> {
    label: String,
    reads: Vec<ResourceId>,
    writes: Vec<ResourceId>,

    #[derivative(Debug = "ignore")]
    run: PassFn<'g>,
}

#[derive(Debug)]
pub struct FrameGraph<'g> {
    transient: Arena,
    history: &'g mut HistoryArena,
    passes: Vec<Pass<'g>>,
    exports: FxHashSet<ResourceId>,
}

impl<'g> FrameGraph<'g> {
    pub fn new(history: &'g mut HistoryArena) -> Self {
        Self {
            transient: Arena::new(ArenaKind::Transient),
            history,
            passes: Default::default(),
            exports: Default::default(),
        }
    }

    /// Creates a resource living until the end of this frame (or until it's
    /// taken out of [`FrameOutput`], if exported).
    pub fn create<T>(&mut self, value: T) -> Handle<T>
    where
        T: Any,
    {
        self.transient.insert(value)
    }

    pub fn history(&self) -> &HistoryArena {
        &*self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryArena {
        &mut *self.history
    }

    /// Marks a transient resource as consumed outside of the graph, so that
    /// passes writing it don't get culled.
    pub fn export<T>(&mut self, handle: Handle<T>) {
        self.exports.insert(handle.id());
    }

    pub fn add_pass(&mut self, label: impl Into<String>) -> PassBuilder<'_, 'g> {
        PassBuilder {
            graph: self,
            label: label.into(),
            reads: Default::default(),
            writes: Default::default(),
        }
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn execute(self) -> FrameOutput {
        let Self {
            transient,
            history,
            passes,
            exports,
        } = self;

        let alive = cull(&passes, &exports);
        let mut executed = Vec::new();

        {
            let resources = Resources {
                transient: &transient,
                history: &**history,
            };

            for (pass, alive) in passes.into_iter().zip(alive) {
                if !alive {
                    trace!("Culling pass: {}", pass.label);
                    continue;
                }

                let stale = pass
                    .reads
                    .iter()
                    .chain(&pass.writes)
                    .find(|id| !resources.contains(**id));

                if let Some(id) = stale {
                    warn!("Skipping pass `{}`: resource {:?} is stale", pass.label, id);
                    continue;
                }

                #[cfg(feature = "metrics")]
                let ((), tt) = measure(|| (pass.run)(&resources));

                #[cfg(not(feature = "metrics"))]
                (pass.run)(&resources);

                #[cfg(feature = "metrics")]
                log::debug!("pass {}: {}", pass.label, humantime::format_duration(tt));

                executed.push(pass.label);
            }
        }

        FrameOutput {
            arena: transient,
            exports,
            executed,
        }
    }
}

/// Returns which passes survive: those writing a history resource, an
/// exported resource, or something a surviving later pass reads.
fn cull(passes: &[Pass], exports: &FxHashSet<ResourceId>) -> Vec<bool> {
    let mut needed = exports.clone();
    let mut alive = vec![false; passes.len()];

    for (idx, pass) in passes.iter().enumerate().rev() {
        let is_needed = pass.writes.iter().any(|id| {
            id.arena() == ArenaKind::History || needed.contains(id)
        });

        if is_needed {
            alive[idx] = true;
            needed.extend(pass.reads.iter().copied());
        }
    }

    alive
}

#[cfg(feature = "metrics")]
fn measure<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let tt = Instant::now();
    let val = f();

    (val, tt.elapsed())
}

pub struct PassBuilder<'a, 'g> {
    graph: &'a mut FrameGraph<'g>,
    label: String,
    reads: Vec<ResourceId>,
    writes: Vec<ResourceId>,
}

impl<'a, 'g> PassBuilder<'a, 'g> {
    pub fn read<T>(mut self, handle: Handle<T>) -> Self {
        self.reads.push(handle.id());
        self
    }

    pub fn write<T>(mut self, handle: Handle<T>) -> Self {
        self.writes.push(handle.id());
        self
    }

    pub fn run(self, run: impl FnOnce(&Resources<'_>) + 'g) {
        self.graph.passes.push(Pass {
            label: self.label,
            reads: self.reads,
            writes: self.writes,
            run: Box::new(run),
        });
    }
}

/// Resources as seen by a running pass.
pub struct Resources<'a> {
    transient: &'a Arena,
    history: &'a Arena,
}

impl Resources<'_> {
    /// # Panics
    ///
    /// Panics when the handle is stale or the resource is being written to
    /// by the same pass.
    pub fn read<T>(&self, handle: Handle<T>) -> Ref<'_, T>
    where
        T: Any,
    {
        self.arena(handle.arena())
            .get(handle)
            .unwrap_or_else(|| panic!("resource {handle:?} is stale"))
    }

    /// # Panics
    ///
    /// Panics when the handle is stale or the resource is already borrowed
    /// by the same pass.
    pub fn write<T>(&self, handle: Handle<T>) -> RefMut<'_, T>
    where
        T: Any,
    {
        self.arena(handle.arena())
            .get_mut(handle)
            .unwrap_or_else(|| panic!("resource {handle:?} is stale"))
    }

    fn contains(&self, id: ResourceId) -> bool {
        self.arena(id.arena()).contains(id)
    }

    fn arena(&self, kind: ArenaKind) -> &Arena {
        match kind {
            ArenaKind::Transient => self.transient,
            ArenaKind::History => self.history,
        }
    }
}

/// What's left of a frame after its execution.
#[derive(Debug)]
pub struct FrameOutput {
    arena: Arena,
    exports: FxHashSet<ResourceId>,
    executed: Vec<String>,
}

impl FrameOutput {
    /// Takes an exported resource out.
    pub fn take<T>(&mut self, handle: Handle<T>) -> Option<T>
    where
        T: Any,
    {
        if !self.exports.contains(&handle.id()) {
            return None;
        }

        self.arena.remove(handle)
    }

    /// Labels of the passes that got executed, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}
