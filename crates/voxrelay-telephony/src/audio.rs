//! Mulaw decode and 8kHz→16kHz upsample for carrier-ingress audio.
//! Grounded on `audio-core`'s G.711 codec (`codec/g711.rs`) for the
//! companding math; outbound TTS audio arrives from the bridge already
//! mulaw-encoded, so only the decode direction is needed here.

pub const CARRIER_SAMPLE_RATE: u32 = 8_000;
pub const BRIDGE_SAMPLE_RATE: u32 = 16_000;

fn mu_law_to_linear(mu_law: u8) -> i16 {
    let mu_law = !mu_law;
    let sign = (mu_law & 0x80) != 0;
    let exp = (mu_law >> 4) & 0x07;
    let mantissa = mu_law & 0x0F;

    let mut pcm: i32 = (((mantissa as i32) << 3) + 0x84) << exp;
    pcm -= 0x84;

    if sign {
        (-pcm) as i16
    } else {
        pcm as i16
    }
}

fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * (from_rate as f64 / to_rate as f64);
        let idx = src_pos.floor() as usize;
        let frac = src_pos - idx as f64;
        let s0 = samples[idx.min(samples.len() - 1)] as f64;
        let s1 = samples[(idx + 1).min(samples.len() - 1)] as f64;
        out.push((s0 + (s1 - s0) * frac).round() as i16);
    }
    out
}

/// Decodes 8-bit mulaw at `CARRIER_SAMPLE_RATE` into 16-bit PCM upsampled to
/// `BRIDGE_SAMPLE_RATE`.
pub fn mulaw_to_pcm(mulaw: &[u8]) -> Vec<u8> {
    let samples: Vec<i16> = mulaw.iter().map(|b| mu_law_to_linear(*b)).collect();
    let upsampled = resample(&samples, CARRIER_SAMPLE_RATE, BRIDGE_SAMPLE_RATE);
    pcm16_to_le_bytes(&upsampled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mulaw_to_pcm_upsamples_to_bridge_rate() {
        let mulaw = vec![0xFFu8; 160]; // 20ms at 8kHz
        let pcm = mulaw_to_pcm(&mulaw);
        assert_eq!(pcm.len(), 320 * 2);
    }
}
