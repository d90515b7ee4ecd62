use crate::core::reference_area::ForestLayers;
use crate::core::terrain::TerrainModel;
use crate::types::{CoordinateSystem, GeoTransform, Grid, Raster, SarError, SarResult};
use gdal::Dataset;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;

const WGS84_EPSG: i32 = 4326;

/// GeoTIFF (or any GDAL-readable) band reader for ancillary layers
pub struct RasterReader;

impl RasterReader {
    /// Read one band as f32; the band's no-data value becomes NaN
    pub fn read_band<P: AsRef<Path>>(path: P, band_index: isize) -> SarResult<Raster> {
        log::debug!("Reading band {} from: {}", band_index, path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        let crs = Self::coordinate_system(&dataset)?;

        let rasterband = dataset.rasterband(band_index)?;
        let no_data = rasterband.no_data_value();
        let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        let mut data = Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| SarError::Processing(format!("Failed to reshape raster data: {}", e)))?;
        if let Some(no_data) = no_data {
            let no_data = no_data as f32;
            data.mapv_inplace(|v| if v == no_data { f32::NAN } else { v });
        }

        log::debug!("Raster size: {}x{}, {:?}", width, height, crs);
        let grid = Grid::new(GeoTransform::from_gdal(geo_transform), (height, width), crs)?;
        Raster::new(data, grid)
    }

    /// Derive slope and aspect from an elevation model
    pub fn read_terrain<P: AsRef<Path>>(dem_path: P, parallel: bool) -> SarResult<TerrainModel> {
        log::info!("⛰️  Reading DEM from: {}", dem_path.as_ref().display());
        TerrainModel::from_dem(Self::read_band(dem_path, 1)?, parallel)
    }

    /// Tree cover, loss year and one land cover raster per year
    pub fn read_forest_layers<P: AsRef<Path>>(
        tree_cover: P,
        loss_year: P,
        land_cover: &[(i32, P)],
    ) -> SarResult<ForestLayers> {
        let land_cover = land_cover
            .iter()
            .map(|(year, path)| Ok((*year, Self::read_band(path, 1)?)))
            .collect::<SarResult<BTreeMap<_, _>>>()?;
        Ok(ForestLayers {
            tree_cover: Self::read_band(tree_cover, 1)?,
            loss_year: Self::read_band(loss_year, 1)?,
            land_cover,
        })
    }

    fn coordinate_system(dataset: &Dataset) -> SarResult<CoordinateSystem> {
        let srs = dataset.spatial_ref()?;
        let epsg = srs.auth_code()?;
        if epsg == WGS84_EPSG {
            Ok(CoordinateSystem::Geographic)
        } else {
            u32::try_from(epsg)
                .map(|epsg| CoordinateSystem::Projected { epsg })
                .map_err(|_| SarError::InvalidFormat(format!("Invalid EPSG code {}", epsg)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdal::raster::Buffer;
    use gdal::spatial_ref::SpatialRef;
    use gdal::DriverManager;

    const NO_DATA: f64 = -9999.0;

    fn write_geotiff(path: &Path, data: Vec<f32>, (width, height): (usize, usize)) -> anyhow::Result<()> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f32, _>(path, width as isize, height as isize, 1)?;
        dataset.set_geo_transform(&[500_000.0, 30.0, 0.0, 5_000_000.0, 0.0, -30.0])?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(32633)?)?;

        let mut band = dataset.rasterband(1)?;
        band.set_no_data_value(Some(NO_DATA))?;
        band.write((0, 0), (width, height), &Buffer::new((width, height), data))?;
        Ok(())
    }

    #[test]
    fn test_no_data_becomes_nan() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("elevation.tif");
        write_geotiff(&path, vec![310.0, NO_DATA as f32, 320.5, 330.0, 340.0, NO_DATA as f32], (3, 2))?;

        let raster = RasterReader::read_band(&path, 1)?;
        assert_eq!(raster.grid.shape, (2, 3));
        assert_eq!(raster.grid.crs, CoordinateSystem::Projected { epsg: 32633 });
        assert_eq!(raster.data[[0, 0]], 310.0);
        assert_eq!(raster.data[[0, 2]], 320.5);
        assert!(raster.data[[0, 1]].is_nan());
        assert!(raster.data[[1, 2]].is_nan());
        assert_eq!(raster.valid_count(), 4);

        let origin = raster.grid.pixel_center(0, 0);
        assert_eq!((origin.x, origin.y), (500_015.0, 4_999_985.0));
        Ok(())
    }
}
