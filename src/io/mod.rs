//! Input readers for scene metadata and ancillary rasters

pub mod manifest;
#[cfg(feature = "gdal")]
pub mod raster;

pub use manifest::ManifestReader;
#[cfg(feature = "gdal")]
pub use raster::RasterReader;
