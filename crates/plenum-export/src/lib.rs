//! plenum-export: Pure previews of planned networks (sans-IO)
//!
//! Renders a [`plenum_topology::NetworkPlan`] as SVG.

pub mod svg;

pub use svg::{SvgMetadata, build_path_data, to_svg};
