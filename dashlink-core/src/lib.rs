//! # dashlink-core — descriptor model and tree resolution
//!
//! The server describes the interface as a tree of component descriptors.
//! This crate holds the pieces that do not depend on any transport:
//!
//! - [`descriptor`] — the normalised [`Descriptor`] sum type and [`Node`]
//! - [`rendered`] — the output tree handed to a presentation layer
//! - [`registry`] — type name → [`Renderer`] mapping
//! - [`resolve`] — the recursive resolver and the [`Mounter`] hook

pub mod descriptor;
pub mod registry;
pub mod rendered;
pub mod resolve;

pub use descriptor::{truthy, Descriptor, EndpointSpec, Node, Properties, DEFAULT_VERSION};
pub use registry::{
    render_contained, ComponentProps, ComponentRegistry, PassthroughRenderer, RenderError,
    Renderer,
};
pub use rendered::Rendered;
pub use resolve::{resolve, resolve_stateless, Mounter, Stateless};
