//! Conversion between WGS 84 longitude/latitude (EPSG:4326) and spherical
//! Web Mercator metres (EPSG:3857).

use geo::{Coord, MapCoords};

/// Radius of the Web Mercator sphere in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitudes beyond this are clamped before projecting.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Projects a single longitude/latitude coordinate to Web Mercator.
#[must_use]
pub fn project_coord(coord: Coord<f64>) -> Coord<f64> {
    let lat = coord.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Coord {
        x: EARTH_RADIUS * coord.x.to_radians(),
        y: EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

/// Converts a Web Mercator coordinate back to longitude/latitude.
#[must_use]
pub fn unproject_coord(coord: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (coord.x / EARTH_RADIUS).to_degrees(),
        y: 2.0f64
            .mul_add((coord.y / EARTH_RADIUS).exp().atan(), -std::f64::consts::FRAC_PI_2)
            .to_degrees(),
    }
}

/// Projects any `geo` geometry from EPSG:4326 to EPSG:3857.
pub fn to_web_mercator<G: MapCoords<f64, f64>>(geometry: &G) -> G::Output {
    geometry.map_coords(project_coord)
}

/// Projects any `geo` geometry from EPSG:3857 back to EPSG:4326.
pub fn from_web_mercator<G: MapCoords<f64, f64>>(geometry: &G) -> G::Output {
    geometry.map_coords(unproject_coord)
}
