//! Plotly figure output.
//!
//! Triangles become flat-shaded `mesh3d` traces with a random face colour,
//! rays that hit something become red `scatter3d` segments ending at the hit
//! point, and the hitting rays' origins get one shared marker trace. Rays
//! that missed are left out.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rand::Rng;
use serde::Serialize;

use crate::error::Result;
use crate::geometry::{Ray, Triangle, Vec3};

const RAY_COLOUR: &str = "rgb(255, 0, 0)";
const MARKER_SIZE: f32 = 2.0;

/// A complete Plotly figure.
#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    /// Traces, triangles first.
    pub data: Vec<Trace>,
    /// Figure layout.
    pub layout: Layout,
}

/// Figure layout.
#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    /// Figure title.
    pub title: String,
}

/// One Plotly trace.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    /// A single triangle.
    Mesh3d {
        /// Vertex x coordinates.
        x: [f32; 3],
        /// Vertex y coordinates.
        y: [f32; 3],
        /// Vertex z coordinates.
        z: [f32; 3],
        /// Face colours.
        facecolor: Vec<String>,
        /// Flat shading.
        flatshading: bool,
    },
    /// Lines or markers.
    Scatter3d {
        /// `"lines"` or `"markers"`.
        mode: &'static str,
        /// X coordinates.
        x: Vec<f32>,
        /// Y coordinates.
        y: Vec<f32>,
        /// Z coordinates.
        z: Vec<f32>,
        /// Line style.
        #[serde(skip_serializing_if = "Option::is_none")]
        line: Option<Line>,
        /// Marker style.
        #[serde(skip_serializing_if = "Option::is_none")]
        marker: Option<Marker>,
    },
}

/// Line style.
#[derive(Debug, Clone, Serialize)]
pub struct Line {
    /// CSS colour.
    pub color: &'static str,
}

/// Marker style.
#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    /// Marker size in pixels.
    pub size: f32,
    /// CSS colour.
    pub color: &'static str,
}

fn random_colour<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "rgb({}, {}, {})",
        rng.random::<u8>(),
        rng.random::<u8>(),
        rng.random::<u8>()
    )
}

fn split(points: impl IntoIterator<Item = Vec3>) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut zs = Vec::new();
    for p in points {
        xs.push(p.x);
        ys.push(p.y);
        zs.push(p.z);
    }
    (xs, ys, zs)
}

/// Build the figure for a scene and its per-ray distances.
pub fn build_figure<R: Rng + ?Sized>(
    triangles: &[Triangle],
    rays: &[(Ray, f32)],
    rng: &mut R,
) -> Figure {
    let mut data: Vec<Trace> = triangles
        .iter()
        .map(|triangle| {
            let [p1, p2, p3] = triangle.vertices();
            Trace::Mesh3d {
                x: [p1.x, p2.x, p3.x],
                y: [p1.y, p2.y, p3.y],
                z: [p1.z, p2.z, p3.z],
                facecolor: vec![random_colour(rng)],
                flatshading: true,
            }
        })
        .collect();

    let hits: Vec<&(Ray, f32)> = rays.iter().filter(|(_, d)| d.is_finite()).collect();

    data.extend(hits.iter().map(|(ray, distance)| {
        let (x, y, z) = split([ray.position, ray.at(*distance)]);
        Trace::Scatter3d {
            mode: "lines",
            x,
            y,
            z,
            line: Some(Line { color: RAY_COLOUR }),
            marker: None,
        }
    }));

    let (x, y, z) = split(hits.iter().map(|(ray, _)| ray.position));
    data.push(Trace::Scatter3d {
        mode: "markers",
        x,
        y,
        z,
        line: None,
        marker: Some(Marker {
            size: MARKER_SIZE,
            color: RAY_COLOUR,
        }),
    });

    log::debug!(
        "figure: {} triangles, {} of {} rays hit",
        triangles.len(),
        hits.len(),
        rays.len()
    );

    Figure {
        data,
        layout: Layout {
            title: format!("{} rays, {} triangles", rays.len(), triangles.len()),
        },
    }
}

/// Standalone HTML page that draws `figure` with Plotly from its CDN.
pub fn render_html(figure: &Figure) -> Result<String> {
    let json = serde_json::to_string(figure)?;
    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
</head>
<body>
<div id="container" style="width:100%;height:100vh;"></div>
<script>
const figure = {json};
Plotly.newPlot("container", figure.data, figure.layout);
</script>
</body>
</html>
"#
    ))
}

/// Write `figure` to `path`: an HTML page for `.html`/`.htm`, Plotly JSON
/// otherwise.
pub fn write_figure(path: &Path, figure: &Figure) -> Result<()> {
    let is_html = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));

    let mut writer = BufWriter::new(File::create(path)?);
    if is_html {
        writer.write_all(render_html(figure)?.as_bytes())?;
    } else {
        serde_json::to_writer(&mut writer, figure)?;
    }
    writer.flush()?;
    log::info!("Wrote figure to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::seeded_rng;
    use serde_json::Value;

    fn scene() -> (Vec<Triangle>, Vec<(Ray, f32)>) {
        let triangles = vec![Triangle::new(
            [-1.0, -1.0, 0.0],
            [-1.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
        )];
        let rays = vec![
            (Ray::new([0.0, 0.0, 1.0], [0.0, 0.0, -1.0]), 1.0),
            (Ray::new([2.0, 0.0, 1.0], [0.0, 0.0, -1.0]), f32::INFINITY),
            (Ray::new([0.5, 0.0, 2.0], [0.0, 0.0, -1.0]), 2.0),
        ];
        (triangles, rays)
    }

    #[test]
    fn test_trace_counts() {
        let (triangles, rays) = scene();
        let figure = build_figure(&triangles, &rays, &mut seeded_rng(Some(9)));
        // 1 mesh + 2 hit segments + 1 marker trace.
        assert_eq!(figure.data.len(), 4);
    }

    #[test]
    fn test_serialized_shape() {
        let (triangles, rays) = scene();
        let figure = build_figure(&triangles, &rays, &mut seeded_rng(Some(9)));
        let json: Value = serde_json::to_value(&figure).unwrap();
        let data = json["data"].as_array().unwrap();

        assert_eq!(data[0]["type"], "mesh3d");
        assert_eq!(data[0]["flatshading"], true);
        assert_eq!(data[0]["x"], serde_json::json!([-1.0, -1.0, 1.0]));
        assert!(data[0]["facecolor"][0].as_str().unwrap().starts_with("rgb("));

        assert_eq!(data[1]["type"], "scatter3d");
        assert_eq!(data[1]["mode"], "lines");
        assert_eq!(data[1]["z"], serde_json::json!([1.0, 0.0]));
        assert_eq!(data[1]["line"]["color"], RAY_COLOUR);
        assert!(data[1].get("marker").is_none());

        assert_eq!(data[3]["mode"], "markers");
        assert_eq!(data[3]["x"], serde_json::json!([0.0, 0.5]));
        assert_eq!(data[3]["marker"]["size"], 2.0);
    }

    #[test]
    fn test_all_misses_keep_empty_marker_trace() {
        let (triangles, mut rays) = scene();
        for (_, d) in &mut rays {
            *d = f32::INFINITY;
        }
        let figure = build_figure(&triangles, &rays, &mut seeded_rng(Some(9)));
        assert_eq!(figure.data.len(), 2);
    }

    #[test]
    fn test_render_html_embeds_figure() {
        let (triangles, rays) = scene();
        let figure = build_figure(&triangles, &rays, &mut seeded_rng(Some(9)));
        let html = render_html(&figure).unwrap();
        assert!(html.contains("Plotly.newPlot(\"container\""));
        assert!(html.contains("\"mesh3d\""));
    }

    #[test]
    fn test_write_figure_json() {
        let (triangles, rays) = scene();
        let figure = build_figure(&triangles, &rays, &mut seeded_rng(Some(9)));
        let path = std::env::temp_dir().join(format!("trihit-plot-{}.json", std::process::id()));
        write_figure(&path, &figure).unwrap();
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(written["data"].as_array().unwrap().len(), 4);
    }
}
