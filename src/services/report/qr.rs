use printpdf::{Color, Mm, PdfLayerReference, Point, Polygon, PolygonMode, Rgb};
use qrcode::{Color as QrColor, QrCode};

#[inline]
fn mm(v: f64) -> Mm {
    Mm(v as f32)
}

/// Draws a QR code as filled squares at (x_mm, y_mm), sized `size_mm`.
/// The payload is the absolute public verification URL of the report.
pub fn draw_qr(
    layer: &PdfLayerReference,
    payload: &str,
    x_mm: f64,
    y_mm: f64,
    size_mm: f64,
) -> Result<(), qrcode::types::QrError> {
    let code = QrCode::new(payload.as_bytes())?;
    let width = code.width();
    let module = size_mm / width as f64;
    let colors = code.to_colors();

    layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    for row in 0..width {
        for col in 0..width {
            if colors[row * width + col] == QrColor::Dark {
                let x = x_mm + col as f64 * module;
                // QR rows grow downward; PDF y grows upward.
                let y = y_mm + size_mm - (row + 1) as f64 * module;
                layer.add_polygon(filled_square(x, y, module));
            }
        }
    }
    Ok(())
}

fn filled_square(x: f64, y: f64, size: f64) -> Polygon {
    Polygon {
        rings: vec![vec![
            (Point::new(mm(x), mm(y)), false),
            (Point::new(mm(x + size), mm(y)), false),
            (Point::new(mm(x + size), mm(y + size)), false),
            (Point::new(mm(x), mm(y + size)), false),
        ]],
        mode: PolygonMode::Fill,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_urls_encode() {
        let code = QrCode::new(
            "https://api.greengate.example/reports/verify/GG-20250101120000-A1B2/page".as_bytes(),
        )
        .unwrap();
        assert!(code.width() > 0);
    }
}
