// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
// GPU / graphics allowances - casts are intentional and safe
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
// Float comparison: graphics math frequently compares against 0.0, 1.0, etc.
#![allow(clippy::float_cmp)]
// Pedantic allowances
#![allow(clippy::suboptimal_flops)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::use_self)]
#![allow(clippy::too_many_lines)]

//! GPU particle dissolve ("dust") effect for message UI layers, built on
//! wgpu.
//!
//! A [`DustLayer`] owns a list of dissolving image regions. Each display
//! refresh it advances their simulation phase, expires finished items, and
//! requests a redraw; servicing the redraw submits a compute pass (particle
//! physics) followed by a render pass (instanced point sprites) into an
//! offscreen target oversampled at 3x the layer's logical bounds, ready for
//! the host to composite.
//!
//! # Key entry points
//!
//! - [`DustLayer`] - the effect layer: add items, attach/detach, render
//! - [`clock::FrameClock`] - shared per-display-refresh tick broadcaster
//! - [`gpu::render_context::RenderContext`] - wgpu device/surface plumbing
//! - [`wallpaper`] - background bitmap generation for the host UI
//!
//! # Architecture
//!
//! The effect is an optional cosmetic: every failure path (texture
//! conversion, pipeline compilation, buffer pooling) degrades to skipping an
//! item or a frame, never to an error or a panic. Compute and render passes
//! are encoded into one submission in compute-then-render order, so queue
//! ordering stands in for fences.

pub mod clock;
pub mod composite;
pub mod effect;
pub mod error;
pub mod gpu;
pub mod options;
pub mod util;
pub mod wallpaper;

pub use effect::layer::DustLayer;
pub use effect::Rect;
