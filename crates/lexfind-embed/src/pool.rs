use anyhow::{Result, bail};
use candle_core::{DType, Tensor};

// pooling as in sentence-transformers: mean over unmasked tokens, then L2.

/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`; returns `[B, H]`.
/// A row whose mask is all zeros pools to the zero vector.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _, hidden_dim) = match hidden.dims() {
        &[b, t, h] => (b, t, h),
        other => bail!("hidden states must be [B,T,H], got {:?}", other),
    };
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let counts = mask.sum_keepdim(1)?.maximum(1f64)?;
    let mean = summed.broadcast_div(&counts)?;
    let eps = if hidden.dtype() == DType::F16 { 1e-6f64 } else { 1e-12f64 };
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(eps)?;
    let pooled = mean.broadcast_div(&norm)?;
    if pooled.dims() != &[batch, hidden_dim] { bail!("pooled shape mismatch: {:?}", pooled.dims()); }
    Ok(pooled)
}
