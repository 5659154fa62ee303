//! NIF interface for Elixir
//!
//! Training runs on a dirty CPU scheduler; it holds the scheduler for the
//! whole run. Frames cross the boundary as native-endian f32 binaries laid
//! out (pol, 2, N), the same layout the arrays use internally.

use ndarray::Array3;
use optical_channel::{ChannelParams, DualPolChannel, Modulation, ShapingModel};
use rustler::{Atom, Binary, Env, NifResult, OwnedBinary};

use crate::config::TrainingConfig;
use crate::plot::{ScatterPlot, ScatterPoints};
use crate::trainer::Trainer;

mod atoms {
    rustler::atoms! {
        ok,
    }
}

fn term_error(err: impl std::fmt::Display) -> rustler::Error {
    rustler::Error::Term(Box::new(err.to_string()))
}

fn rows(table: &ndarray::Array2<f64>) -> Vec<Vec<f64>> {
    table.outer_iter().map(|row| row.to_vec()).collect()
}

/// Copy an f64 tensor into a BEAM binary of native-endian f32
fn f32_binary<'a>(env: Env<'a>, data: &Array3<f64>) -> NifResult<Binary<'a>> {
    let mut owned = OwnedBinary::new(data.len() * 4)
        .ok_or_else(|| rustler::Error::Term(Box::new("binary_alloc_failed")))?;

    let out = owned.as_mut_slice();
    for (chunk, v) in out.chunks_exact_mut(4).zip(data.iter()) {
        chunk.copy_from_slice(&(*v as f32).to_ne_bytes());
    }

    Ok(owned.release(env))
}

// ============================================================================
// Training
// ============================================================================

/// Run the full training loop.
/// Returns `{ser_valid, var_est, var}` with the tensors as lists of rows.
#[rustler::nif(schedule = "DirtyCpu")]
fn processing(config: TrainingConfig) -> NifResult<(Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>)> {
    let outcome = Trainer::new(config)
        .and_then(Trainer::run)
        .map_err(|err| {
            tracing::error!(%err, "training aborted");
            term_error(err)
        })?;

    Ok((rows(&outcome.ser_valid), rows(&outcome.var_est), outcome.var))
}

// ============================================================================
// Channel
// ============================================================================

/// Generate one seeded frame.
/// Output: `{:ok, rx, symbols}`, rx is (2, 2, N·sps) and symbols (2, 2, N)
#[rustler::nif(schedule = "DirtyCpu")]
fn generate_frame<'a>(
    env: Env<'a>,
    params: ChannelParams,
    seed: u64,
    num_symbols: usize,
    theta: f64,
) -> NifResult<(Atom, Binary<'a>, Binary<'a>)> {
    let frame = DualPolChannel::new(params, seed)
        .and_then(|mut channel| channel.generate(num_symbols, theta))
        .map_err(term_error)?;

    Ok((
        atoms::ok(),
        f32_binary(env, &frame.rx)?,
        f32_binary(env, &frame.symbols)?,
    ))
}

/// Amplitude levels and their probabilities for one modulation and shaping.
/// Returns `{levels, probs, nu_sc, pow_mean}`.
#[rustler::nif]
fn shaping_levels(modulation: Modulation, nu: f64) -> NifResult<(Vec<f64>, Vec<f64>, f64, f64)> {
    let shaping = ShapingModel::new(modulation, nu).map_err(term_error)?;

    Ok((
        shaping.amp_levels().to_vec(),
        shaping.probs().to_vec(),
        shaping.nu_sc(),
        shaping.pow_mean(),
    ))
}

// ============================================================================
// Plotting
// ============================================================================

#[rustler::nif]
fn constellation_scatter(points: ScatterPoints) -> NifResult<ScatterPlot> {
    points.into_plot().map_err(term_error)
}
