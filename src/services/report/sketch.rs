use printpdf::{Color, Line, Mm, PdfLayerReference, Point, Rgb};

/// Extracts drawable exterior rings from a GeoJSON geometry value.
/// `ST_Intersection` may return polygons, multipolygons or collections;
/// points and lines have no drawable area and are ignored.
pub fn rings_from_geojson(value: &serde_json::Value) -> Vec<Vec<(f64, f64)>> {
    let mut rings = Vec::new();
    collect_rings(value, &mut rings);
    rings
}

fn collect_rings(value: &serde_json::Value, out: &mut Vec<Vec<(f64, f64)>>) {
    match value.get("type").and_then(|t| t.as_str()) {
        Some("Polygon") => {
            if let Some(ring) = value
                .get("coordinates")
                .and_then(|c| c.as_array())
                .and_then(|rings| rings.first())
            {
                if let Some(points) = ring_points(ring) {
                    out.push(points);
                }
            }
        }
        Some("MultiPolygon") => {
            if let Some(polys) = value.get("coordinates").and_then(|c| c.as_array()) {
                for poly in polys {
                    if let Some(ring) = poly.as_array().and_then(|rings| rings.first()) {
                        if let Some(points) = ring_points(ring) {
                            out.push(points);
                        }
                    }
                }
            }
        }
        Some("GeometryCollection") => {
            if let Some(geoms) = value.get("geometries").and_then(|g| g.as_array()) {
                for geom in geoms {
                    collect_rings(geom, out);
                }
            }
        }
        _ => {}
    }
}

fn ring_points(ring: &serde_json::Value) -> Option<Vec<(f64, f64)>> {
    let positions = ring.as_array()?;
    let points: Vec<(f64, f64)> = positions
        .iter()
        .filter_map(|pos| {
            let pair = pos.as_array()?;
            Some((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
        })
        .collect();
    (points.len() >= 3).then_some(points)
}

/// Maps lon/lat rings into a page rectangle, preserving aspect ratio.
pub struct SketchBox {
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
    min_x: f64,
    min_y: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl SketchBox {
    /// Fits the combined bounds of all rings into the box with a small
    /// inner margin.
    pub fn fit(x_mm: f64, y_mm: f64, width_mm: f64, height_mm: f64, rings: &[Vec<(f64, f64)>]) -> Option<Self> {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for ring in rings {
            for &(x, y) in ring {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
        if !min_x.is_finite() {
            return None;
        }

        let margin = 4.0;
        let inner_w = width_mm - 2.0 * margin;
        let inner_h = height_mm - 2.0 * margin;
        let span_x = (max_x - min_x).max(1e-9);
        let span_y = (max_y - min_y).max(1e-9);
        let scale = (inner_w / span_x).min(inner_h / span_y);

        // Center the drawing inside the box.
        let offset_x = x_mm + margin + (inner_w - span_x * scale) / 2.0;
        let offset_y = y_mm + margin + (inner_h - span_y * scale) / 2.0;

        Some(Self { x_mm, y_mm, width_mm, height_mm, min_x, min_y, scale, offset_x, offset_y })
    }

    fn project(&self, (x, y): (f64, f64)) -> Point {
        Point::new(
            mm(self.offset_x + (x - self.min_x) * self.scale),
            mm(self.offset_y + (y - self.min_y) * self.scale),
        )
    }

    /// Draws the box frame.
    pub fn draw_frame(&self, layer: &PdfLayerReference) {
        layer.set_outline_color(Color::Rgb(Rgb::new(0.7, 0.7, 0.7, None)));
        layer.set_outline_thickness(0.4);
        layer.add_shape(Line {
            points: vec![
                (Point::new(mm(self.x_mm), mm(self.y_mm)), false),
                (Point::new(mm(self.x_mm + self.width_mm), mm(self.y_mm)), false),
                (Point::new(mm(self.x_mm + self.width_mm), mm(self.y_mm + self.height_mm)), false),
                (Point::new(mm(self.x_mm), mm(self.y_mm + self.height_mm)), false),
            ],
            is_closed: true,
            has_fill: false,
            has_stroke: true,
            is_clipping_path: false,
        });
    }

    /// Draws one ring outline in the given color/thickness.
    pub fn draw_ring(&self, layer: &PdfLayerReference, ring: &[(f64, f64)], color: Rgb, thickness: f64) {
        if ring.len() < 3 {
            return;
        }
        layer.set_outline_color(Color::Rgb(color));
        layer.set_outline_thickness(thickness);
        layer.add_shape(Line {
            points: ring.iter().map(|&p| (self.project(p), false)).collect(),
            is_closed: true,
            has_fill: false,
            has_stroke: true,
            is_clipping_path: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_rings_from_polygon_and_collection() {
        let polygon = json!({
            "type": "Polygon",
            "coordinates": [[[-46.5, -23.5], [-46.5, -23.51], [-46.49, -23.51], [-46.5, -23.5]]]
        });
        assert_eq!(rings_from_geojson(&polygon).len(), 1);

        let collection = json!({
            "type": "GeometryCollection",
            "geometries": [
                { "type": "Point", "coordinates": [-46.5, -23.5] },
                polygon,
                {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[-46.4, -23.4], [-46.4, -23.41], [-46.39, -23.41], [-46.4, -23.4]]],
                        [[[-46.3, -23.3], [-46.3, -23.31], [-46.29, -23.31], [-46.3, -23.3]]]
                    ]
                }
            ]
        });
        assert_eq!(rings_from_geojson(&collection).len(), 3);
    }

    #[test]
    fn fit_preserves_aspect_and_bounds() {
        let rings = vec![vec![(-46.5, -23.5), (-46.5, -23.51), (-46.49, -23.51)]];
        let sketch = SketchBox::fit(20.0, 100.0, 80.0, 60.0, &rings).unwrap();
        // Scale must be finite and positive for a non-degenerate ring.
        assert!(sketch.scale.is_finite() && sketch.scale > 0.0);
        assert!(sketch.offset_x >= 20.0 && sketch.offset_y >= 100.0);

        assert!(SketchBox::fit(0.0, 0.0, 10.0, 10.0, &[]).is_none());
    }
}
