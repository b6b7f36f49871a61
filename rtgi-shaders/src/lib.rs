//! Kernels of the GI pipeline.
//!
//! Every module exposes one entry point (`main()`, sometimes a couple of
//! variants) invoked once per element of the dispatch grid; kernels never
//! allocate and only touch the resources they are given.

#![allow(clippy::too_many_arguments)]

pub mod brute_force;
pub mod ddgi_blend;
pub mod ddgi_border;
pub mod ddgi_classify;
pub mod ddgi_relocate;
pub mod ddgi_scroll;
pub mod ddgi_trace;
pub mod light_cuts;
pub mod light_tree_leaves;
pub mod light_tree_levels;
pub mod light_tree_morton;
pub mod light_tree_sort;
pub mod prefix_scan;
pub mod restir_boiling;
pub mod restir_evaluate;
pub mod restir_fused;
pub mod restir_initial;
pub mod restir_spatial;
pub mod restir_temporal;
pub mod surfel_accumulate;
pub mod surfel_allocate;
pub mod surfel_bin;
pub mod surfel_find_miss;
pub mod surfel_recycle;
pub mod surfel_shade;

mod restir;
mod shading;
