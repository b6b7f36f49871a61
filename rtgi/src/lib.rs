//! Real-time diffuse global illumination: ReSTIR GI, DDGI probe volumes,
//! surfels and a brute-force reference, recorded as passes of a frame graph
//! and executed on the CPU.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::too_many_arguments)]

mod backend;
mod brute_force;
mod config;
mod ddgi;
mod frame;
mod graph;
mod light;
mod light_cuts;
mod light_tree;
mod lights;
mod renderer;
mod restir;
mod scene;
mod surfel;
mod view;

pub use self::backend::*;
pub use self::brute_force::*;
pub use self::config::*;
pub use self::ddgi::*;
pub use self::frame::*;
pub use self::graph::*;
pub use self::light::*;
pub use self::light_cuts::*;
pub use self::light_tree::*;
pub use self::lights::*;
pub use self::renderer::*;
pub use self::restir::*;
pub use self::scene::*;
pub use self::surfel::*;
pub use self::view::*;
