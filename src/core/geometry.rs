use geo::{BoundingRect, Centroid, Coord, GeodesicArea, LineString, MultiPolygon, Polygon, Validation};
use serde_json::Value;

use crate::compliance_models::GeoJsonGeometry;
use crate::config::Settings;

/// Why a submitted geometry was refused. Messages name the rule that failed
/// so clients can fix their input.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GeometryError {
    #[error("Tipo de geometria não suportado: '{0}'. Use Polygon ou MultiPolygon.")]
    UnsupportedType(String),
    #[error("Coordenadas malformadas: {0}")]
    MalformedCoordinates(String),
    #[error("Anel do polígono precisa de pelo menos 4 vértices (recebidos: {0})")]
    TooFewVertices(usize),
    #[error("Anel do polígono não está fechado (primeiro vértice != último)")]
    RingNotClosed,
    #[error("Geometria excede o máximo de {max} vértices (recebidos: {got})")]
    TooManyVertices { got: usize, max: usize },
    #[error("Vértice ({lon}, {lat}) fora do território brasileiro")]
    OutsideBrazil { lon: f64, lat: f64 },
    #[error("Geometria topologicamente inválida (auto-interseção ou anéis cruzados)")]
    TopologyInvalid,
    #[error("Área de {got:.2} ha excede o máximo de {max:.0} ha")]
    AreaTooLarge { got: f64, max: f64 },
}

/// A polygon that passed every input invariant. Only this type reaches the
/// spatial store.
#[derive(Debug, Clone)]
pub struct ValidatedPolygon {
    geometry: MultiPolygon<f64>,
    geojson: Value,
    area_ha: f64,
    vertex_count: usize,
}

impl ValidatedPolygon {
    /// Validates a raw GeoJSON geometry against the input invariants, in
    /// order: type, ring shape, vertex budget, Brazil bbox, topology, area.
    pub fn from_geojson(geom: &GeoJsonGeometry, settings: &Settings) -> Result<Self, GeometryError> {
        let polygons_coords = match geom.geometry_type.as_str() {
            "Polygon" => vec![parse_polygon_rings(&geom.coordinates)?],
            "MultiPolygon" => {
                let arr = geom
                    .coordinates
                    .as_array()
                    .ok_or_else(|| GeometryError::MalformedCoordinates("esperado array de polígonos".into()))?;
                arr.iter().map(parse_polygon_rings).collect::<Result<Vec<_>, _>>()?
            }
            other => return Err(GeometryError::UnsupportedType(other.to_string())),
        };

        let mut vertex_count = 0usize;
        for rings in &polygons_coords {
            for ring in rings {
                if ring.len() < 4 {
                    return Err(GeometryError::TooFewVertices(ring.len()));
                }
                if ring.first() != ring.last() {
                    return Err(GeometryError::RingNotClosed);
                }
                vertex_count += ring.len();
            }
        }
        if vertex_count > settings.max_geom_vertices {
            return Err(GeometryError::TooManyVertices {
                got: vertex_count,
                max: settings.max_geom_vertices,
            });
        }

        for rings in &polygons_coords {
            for ring in rings {
                for &(lon, lat) in ring {
                    let inside = lon >= settings.brazil_bbox_min_lon
                        && lon <= settings.brazil_bbox_max_lon
                        && lat >= settings.brazil_bbox_min_lat
                        && lat <= settings.brazil_bbox_max_lat;
                    if !inside {
                        return Err(GeometryError::OutsideBrazil { lon, lat });
                    }
                }
            }
        }

        let geometry = MultiPolygon::new(
            polygons_coords
                .iter()
                .map(|rings| {
                    let exterior = ring_to_linestring(&rings[0]);
                    let interiors = rings[1..].iter().map(|r| ring_to_linestring(r)).collect();
                    Polygon::new(exterior, interiors)
                })
                .collect(),
        );

        if !geometry.is_valid() {
            return Err(GeometryError::TopologyInvalid);
        }

        // Geodesic area on the WGS84 ellipsoid, m^2 -> ha.
        let area_ha = geometry.geodesic_area_unsigned() / 10_000.0;
        if area_ha > settings.max_area_ha {
            return Err(GeometryError::AreaTooLarge { got: area_ha, max: settings.max_area_ha });
        }

        Ok(Self {
            geometry,
            geojson: geom.to_value(),
            area_ha,
            vertex_count,
        })
    }

    pub fn area_ha(&self) -> f64 {
        self.area_ha
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Full input geometry, exactly as submitted.
    pub fn geojson(&self) -> &Value {
        &self.geojson
    }

    /// Bounding box as [minx, miny, maxx, maxy].
    pub fn bbox(&self) -> Option<[f64; 4]> {
        self.geometry
            .bounding_rect()
            .map(|r| [r.min().x, r.min().y, r.max().x, r.max().y])
    }

    /// Centroid formatted as "lat, lon" (six decimals).
    pub fn centroid_string(&self) -> Option<String> {
        self.geometry
            .centroid()
            .map(|c| format!("{:.6}, {:.6}", c.y(), c.x()))
    }

    /// WKT serialization for parameter binding into PostGIS queries.
    pub fn to_wkt(&self) -> String {
        let polygons: Vec<String> = self
            .geometry
            .iter()
            .map(|poly| {
                let mut rings: Vec<String> = vec![linestring_to_wkt_ring(poly.exterior())];
                rings.extend(poly.interiors().iter().map(linestring_to_wkt_ring));
                format!("({})", rings.join(","))
            })
            .collect();
        format!("MULTIPOLYGON({})", polygons.join(","))
    }
}

fn ring_to_linestring(ring: &[(f64, f64)]) -> LineString<f64> {
    LineString::from(ring.iter().map(|&(x, y)| Coord { x, y }).collect::<Vec<_>>())
}

fn linestring_to_wkt_ring(ls: &LineString<f64>) -> String {
    let coords: Vec<String> = ls.coords().map(|c| format!("{} {}", c.x, c.y)).collect();
    format!("({})", coords.join(","))
}

/// Parses one GeoJSON polygon (array of rings) into coordinate tuples.
fn parse_polygon_rings(value: &Value) -> Result<Vec<Vec<(f64, f64)>>, GeometryError> {
    let rings = value
        .as_array()
        .ok_or_else(|| GeometryError::MalformedCoordinates("esperado array de anéis".into()))?;
    if rings.is_empty() {
        return Err(GeometryError::MalformedCoordinates("polígono sem anéis".into()));
    }
    rings
        .iter()
        .map(|ring| {
            let positions = ring
                .as_array()
                .ok_or_else(|| GeometryError::MalformedCoordinates("anel não é um array".into()))?;
            positions
                .iter()
                .map(|pos| {
                    let pair = pos
                        .as_array()
                        .filter(|p| p.len() >= 2)
                        .ok_or_else(|| GeometryError::MalformedCoordinates("posição não é um par [lon, lat]".into()))?;
                    let lon = pair[0]
                        .as_f64()
                        .ok_or_else(|| GeometryError::MalformedCoordinates("longitude não numérica".into()))?;
                    let lat = pair[1]
                        .as_f64()
                        .ok_or_else(|| GeometryError::MalformedCoordinates("latitude não numérica".into()))?;
                    Ok((lon, lat))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> Settings {
        Settings::from_env()
    }

    fn geom(value: Value) -> GeoJsonGeometry {
        serde_json::from_value(value).unwrap()
    }

    fn small_square() -> GeoJsonGeometry {
        geom(json!({
            "type": "Polygon",
            "coordinates": [[
                [-46.50, -23.50], [-46.50, -23.51], [-46.49, -23.51],
                [-46.49, -23.50], [-46.50, -23.50]
            ]]
        }))
    }

    #[test]
    fn accepts_a_small_square_in_sao_paulo() {
        let p = ValidatedPolygon::from_geojson(&small_square(), &settings()).unwrap();
        // ~1.1 km x 1.1 km -> on the order of 110-125 ha
        assert!(p.area_ha() > 50.0 && p.area_ha() < 200.0, "area={}", p.area_ha());
        assert_eq!(p.vertex_count(), 5);
        let bbox = p.bbox().unwrap();
        assert_eq!(bbox, [-46.50, -23.51, -46.49, -23.50]);
        assert!(p.centroid_string().unwrap().starts_with("-23.505"));
        assert!(p.to_wkt().starts_with("MULTIPOLYGON((("));
    }

    #[test]
    fn rejects_non_polygon_types() {
        let point = geom(json!({ "type": "Point", "coordinates": [-46.5, -23.5] }));
        assert!(matches!(
            ValidatedPolygon::from_geojson(&point, &settings()),
            Err(GeometryError::UnsupportedType(_))
        ));
    }

    #[test]
    fn rejects_open_ring() {
        let open = geom(json!({
            "type": "Polygon",
            "coordinates": [[
                [-46.50, -23.50], [-46.50, -23.51], [-46.49, -23.51], [-46.49, -23.50]
            ]]
        }));
        assert!(matches!(
            ValidatedPolygon::from_geojson(&open, &settings()),
            Err(GeometryError::RingNotClosed)
        ));
    }

    #[test]
    fn rejects_triangle_with_too_few_vertices() {
        let tri = geom(json!({
            "type": "Polygon",
            "coordinates": [[[-46.50, -23.50], [-46.49, -23.51], [-46.50, -23.50]]]
        }));
        assert!(matches!(
            ValidatedPolygon::from_geojson(&tri, &settings()),
            Err(GeometryError::TooFewVertices(3))
        ));
    }

    #[test]
    fn rejects_vertices_outside_brazil() {
        let paris = geom(json!({
            "type": "Polygon",
            "coordinates": [[
                [2.29, 48.85], [2.29, 48.86], [2.30, 48.86], [2.30, 48.85], [2.29, 48.85]
            ]]
        }));
        assert!(matches!(
            ValidatedPolygon::from_geojson(&paris, &settings()),
            Err(GeometryError::OutsideBrazil { .. })
        ));
    }

    #[test]
    fn rejects_self_intersecting_bowtie() {
        let bowtie = geom(json!({
            "type": "Polygon",
            "coordinates": [[
                [-46.50, -23.50], [-46.49, -23.51], [-46.50, -23.51],
                [-46.49, -23.50], [-46.50, -23.50]
            ]]
        }));
        assert!(matches!(
            ValidatedPolygon::from_geojson(&bowtie, &settings()),
            Err(GeometryError::TopologyInvalid)
        ));
    }

    #[test]
    fn rejects_area_above_limit() {
        // ~1 degree x 1 degree near the equator is far beyond 10,000 ha.
        let huge = geom(json!({
            "type": "Polygon",
            "coordinates": [[
                [-60.0, -3.0], [-60.0, -4.0], [-59.0, -4.0], [-59.0, -3.0], [-60.0, -3.0]
            ]]
        }));
        assert!(matches!(
            ValidatedPolygon::from_geojson(&huge, &settings()),
            Err(GeometryError::AreaTooLarge { .. })
        ));
    }

    #[test]
    fn vertex_budget_boundary() {
        // Build a closed ring with exactly max+1 redundant vertices to trip the cap.
        let max = settings().max_geom_vertices;
        let mut coords: Vec<Vec<f64>> = Vec::with_capacity(max + 1);
        for i in 0..max {
            let t = i as f64 / max as f64;
            // Small circle near Campinas, radius ~0.01 degrees.
            let lon = -47.05 + 0.01 * (t * std::f64::consts::TAU).cos();
            let lat = -22.90 + 0.01 * (t * std::f64::consts::TAU).sin();
            coords.push(vec![lon, lat]);
        }
        coords.push(coords[0].clone());
        let over = geom(json!({ "type": "Polygon", "coordinates": [coords] }));
        assert!(matches!(
            ValidatedPolygon::from_geojson(&over, &settings()),
            Err(GeometryError::TooManyVertices { .. })
        ));
    }

    #[test]
    fn wkt_serialization_is_exact() {
        let p = ValidatedPolygon::from_geojson(&small_square(), &settings()).unwrap();
        assert_eq!(
            p.to_wkt(),
            "MULTIPOLYGON(((-46.5 -23.5,-46.5 -23.51,-46.49 -23.51,-46.49 -23.5,-46.5 -23.5)))"
        );
    }

    #[test]
    fn multipolygon_is_accepted() {
        let mp = geom(json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[-46.50, -23.50], [-46.50, -23.51], [-46.49, -23.51], [-46.49, -23.50], [-46.50, -23.50]]],
                [[[-46.47, -23.50], [-46.47, -23.51], [-46.46, -23.51], [-46.46, -23.50], [-46.47, -23.50]]]
            ]
        }));
        let p = ValidatedPolygon::from_geojson(&mp, &settings()).unwrap();
        assert_eq!(p.vertex_count(), 10);
        assert!(p.to_wkt().contains(")),(("));
    }
}
