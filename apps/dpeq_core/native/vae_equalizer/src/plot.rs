//! Constellation scatter series
//!
//! Rendering happens on the Elixir side; this module only labels and styles
//! the points. Values pass through unchanged.

use ndarray::{Array3, ArrayView3};
use num_complex::Complex64;
use rustler::{NifStruct, NifTaggedEnum};

use crate::error::{TrainError, TrainResult};

/// Marker size and alpha for complex-valued input
pub const COMPLEX_MARKER: (f64, f64) = (1.0, 0.5);
/// Marker size and alpha for real (I, Q) input
pub const REAL_MARKER: (f64, f64) = (3.0, 0.8);

const POL_STYLE: [(&str, &str); 2] = [("X", "red"), ("Y", "blue")];

/// One polarization's points
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "DpeqCore.Plot.Series"]
pub struct ScatterSeries {
    pub label: String,
    pub color: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub marker_size: f64,
    pub alpha: f64,
}

/// Series plus axis labels
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "DpeqCore.Plot.Scatter"]
pub struct ScatterPlot {
    pub series: Vec<ScatterSeries>,
    pub x_label: String,
    pub y_label: String,
}

/// Points as they arrive from Elixir
#[derive(NifTaggedEnum, Debug, Clone)]
pub enum ScatterPoints {
    /// `{:complex, [[{re, im}, ...], ...]}`, shape (pol, N)
    Complex(Vec<Vec<(f64, f64)>>),
    /// `{:complex_flat, [{re, im}, ...]}`, shape (N)
    ComplexFlat(Vec<(f64, f64)>),
    /// `{:real, [[i_list, q_list], ...]}`, shape (pol, 2, N)
    Real(Vec<Vec<Vec<f64>>>),
    /// `{:real_flat, [i_list, q_list]}`, shape (2, N)
    RealFlat(Vec<Vec<f64>>),
}

fn series(p: usize, x: Vec<f64>, y: Vec<f64>, marker: (f64, f64)) -> ScatterSeries {
    let (label, color) = POL_STYLE[p % POL_STYLE.len()];
    ScatterSeries {
        label: label.to_string(),
        color: color.to_string(),
        x,
        y,
        marker_size: marker.0,
        alpha: marker.1,
    }
}

fn plot(series: Vec<ScatterSeries>) -> ScatterPlot {
    ScatterPlot {
        series,
        x_label: "In-Phase".to_string(),
        y_label: "Quadrature".to_string(),
    }
}

/// Complex points, one row per polarization
pub fn scatter_complex(points: &[Vec<Complex64>]) -> ScatterPlot {
    plot(
        points
            .iter()
            .enumerate()
            .map(|(p, row)| {
                series(
                    p,
                    row.iter().map(|z| z.re).collect(),
                    row.iter().map(|z| z.im).collect(),
                    COMPLEX_MARKER,
                )
            })
            .collect(),
    )
}

/// Real points, (pol, 2, N) with axis 1 = (I, Q)
pub fn scatter_real(points: ArrayView3<f64>) -> TrainResult<ScatterPlot> {
    let (pol, dims, n) = points.dim();
    if dims != 2 {
        return Err(TrainError::shape("scatter points", &[pol, 2, n], points.shape()));
    }

    Ok(plot(
        (0..pol)
            .map(|p| {
                series(
                    p,
                    points.slice(ndarray::s![p, 0, ..]).to_vec(),
                    points.slice(ndarray::s![p, 1, ..]).to_vec(),
                    REAL_MARKER,
                )
            })
            .collect(),
    ))
}

fn stack_real(rows: Vec<Vec<Vec<f64>>>) -> TrainResult<Array3<f64>> {
    let pol = rows.len();
    let n = rows.first().and_then(|r| r.first()).map_or(0, Vec::len);
    let flat: Vec<f64> = rows.iter().flatten().flatten().copied().collect();

    let ragged = rows.iter().any(|r| r.len() != 2 || r.iter().any(|d| d.len() != n));
    if ragged {
        return Err(TrainError::shape("scatter points", &[pol, 2, n], &[flat.len()]));
    }

    Array3::from_shape_vec((pol, 2, n), flat)
        .map_err(|_| TrainError::shape("scatter points", &[pol, 2, n], &[pol * 2 * n]))
}

impl ScatterPoints {
    pub fn into_plot(self) -> TrainResult<ScatterPlot> {
        let to_complex = |row: Vec<(f64, f64)>| -> Vec<Complex64> {
            row.into_iter().map(|(re, im)| Complex64::new(re, im)).collect()
        };

        match self {
            ScatterPoints::Complex(rows) => Ok(scatter_complex(
                &rows.into_iter().map(to_complex).collect::<Vec<_>>(),
            )),
            ScatterPoints::ComplexFlat(row) => Ok(scatter_complex(&[to_complex(row)])),
            ScatterPoints::Real(rows) => scatter_real(stack_real(rows)?.view()),
            ScatterPoints::RealFlat(dims) => scatter_real(stack_real(vec![dims])?.view()),
        }
    }
}
