//! WAV framing and mulaw/PCM conversion. Grounded on
//! `audio-core`'s G.711 codec (`codec/g711.rs`) for the mulaw companding
//! math, generalized here to the bridge's own 8kHz<->16kHz resampling needs
//! rather than audio-core's RTP-frame codec trait.

pub const TWILIO_SAMPLE_RATE: u32 = 8_000;
pub const BRIDGE_SAMPLE_RATE: u32 = 16_000;

/// Synthesizes a 44-byte canonical RIFF/WAVE header followed by `pcm`.
/// `sample_rate` is the PCM's rate; audio is always mono 16-bit.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let num_channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * num_channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = num_channels * (bits_per_sample / 8);
    let data_size = pcm.len() as u32;
    let chunk_size = 36 + data_size;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&chunk_size.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&num_channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

fn linear_to_mu_law(sample: i16) -> u8 {
    let mask = if sample < 0 { 0x7F } else { 0xFF };
    let pcm = if sample < 0 { (-(sample as i32)) as u16 } else { sample as u16 };
    let pcm = pcm.saturating_add(33);

    let exp = if pcm > 0x1FFF {
        7
    } else if pcm > 0x0FFF {
        6
    } else if pcm > 0x07FF {
        5
    } else if pcm > 0x03FF {
        4
    } else if pcm > 0x01FF {
        3
    } else if pcm > 0x00FF {
        2
    } else if pcm > 0x007F {
        1
    } else {
        0
    };

    let mantissa = (pcm >> (exp + 3)) & 0x0F;
    let mu_law = !((exp << 4) | mantissa);
    (mu_law & mask) as u8
}

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

fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Linear-interpolation resample of 16-bit PCM between arbitrary rates.
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

/// Decodes 8-bit mulaw at `TWILIO_SAMPLE_RATE` into 16-bit PCM upsampled to
/// `BRIDGE_SAMPLE_RATE`.
pub fn mulaw_to_pcm(mulaw: &[u8]) -> Vec<u8> {
    let samples: Vec<i16> = mulaw.iter().map(|b| mu_law_to_linear(*b)).collect();
    let upsampled = resample(&samples, TWILIO_SAMPLE_RATE, BRIDGE_SAMPLE_RATE);
    pcm16_to_le_bytes(&upsampled)
}

/// Downsamples 16-bit PCM at `BRIDGE_SAMPLE_RATE` to `TWILIO_SAMPLE_RATE`
/// and encodes to 8-bit mulaw.
pub fn pcm_to_mulaw(pcm: &[u8]) -> Vec<u8> {
    let samples = pcm16_from_le_bytes(pcm);
    let downsampled = resample(&samples, BRIDGE_SAMPLE_RATE, TWILIO_SAMPLE_RATE);
    downsampled.iter().map(|s| linear_to_mu_law(*s)).collect()
}

/// Format sniffed by magic bytes: `RIFF` for WAV, an MP3 frame sync
/// (`0xFF` followed by a byte with the top 3 bits set) otherwise assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Wav,
    Mp3,
    Unknown,
}

pub fn detect_format(data: &[u8]) -> DetectedFormat {
    if data.len() >= 4 && &data[0..4] == b"RIFF" {
        DetectedFormat::Wav
    } else if data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xE0) == 0xE0 {
        DetectedFormat::Mp3
    } else {
        DetectedFormat::Unknown
    }
}

/// Strips a WAV container down to its raw PCM payload (assumes the
/// canonical 44-byte header written by `pcm_to_wav`; tolerates extra
/// chunks before `data` by scanning for the marker).
pub fn wav_to_pcm(wav: &[u8]) -> crate::error::Result<Vec<u8>> {
    let pos = wav
        .windows(4)
        .position(|w| w == b"data")
        .ok_or(crate::error::BridgeError::UnsupportedFormat)?;
    let data_start = pos + 8; // skip "data" + u32 length
    if data_start > wav.len() {
        return Err(crate::error::BridgeError::UnsupportedFormat);
    }
    Ok(wav[data_start..].to_vec())
}

fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Decodes an MP3 stream frame-by-frame, downmixing to mono and resampling
/// every frame to `BRIDGE_SAMPLE_RATE` (a TTS provider may vary the MP3's
/// own sample rate frame to frame around a join point, so resampling
/// happens per frame rather than once at the end).
pub fn mp3_to_pcm(mp3: &[u8]) -> crate::error::Result<Vec<u8>> {
    let mut decoder = minimp3::Decoder::new(std::io::Cursor::new(mp3));
    let mut pcm: Vec<i16> = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let mono = downmix_to_mono(&frame.data, frame.channels);
                let resampled = resample(&mono, frame.sample_rate as u32, BRIDGE_SAMPLE_RATE);
                pcm.extend(resampled);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(crate::error::BridgeError::internal(format!("mp3 decode failed: {e}"))),
        }
    }

    if pcm.is_empty() {
        return Err(crate::error::BridgeError::UnsupportedFormat);
    }

    Ok(pcm16_to_le_bytes(&pcm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_is_44_bytes_plus_payload() {
        let pcm = vec![0u8; 100];
        let wav = pcm_to_wav(&pcm, BRIDGE_SAMPLE_RATE);
        assert_eq!(wav.len(), 44 + pcm.len());
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn wav_round_trips_pcm_payload() {
        let pcm = vec![1, 2, 3, 4, 5, 6];
        let wav = pcm_to_wav(&pcm, BRIDGE_SAMPLE_RATE);
        assert_eq!(wav_to_pcm(&wav).unwrap(), pcm);
    }

    #[test]
    fn mulaw_round_trip_is_lossy_but_close() {
        let original: i16 = 10_000;
        let encoded = linear_to_mu_law(original);
        let decoded = mu_law_to_linear(encoded);
        assert!((decoded as i32 - original as i32).abs() < 500);
    }

    #[test]
    fn mulaw_to_pcm_upsamples_to_bridge_rate() {
        let mulaw = vec![0xFFu8; 160]; // 20ms at 8kHz
        let pcm = mulaw_to_pcm(&mulaw);
        // 160 mulaw bytes @ 8kHz -> 320 samples @ 16kHz -> 640 bytes
        assert_eq!(pcm.len(), 320 * 2);
    }

    #[test]
    fn pcm_to_mulaw_downsamples_to_twilio_rate() {
        let pcm = pcm16_to_le_bytes(&vec![0i16; 320]); // 20ms at 16kHz
        let mulaw = pcm_to_mulaw(&pcm);
        assert_eq!(mulaw.len(), 160);
    }

    #[test]
    fn detects_wav_and_mp3_magic() {
        assert_eq!(detect_format(b"RIFF....WAVE"), DetectedFormat::Wav);
        assert_eq!(detect_format(&[0xFF, 0xE3, 0x00]), DetectedFormat::Mp3);
        assert_eq!(detect_format(&[0x00, 0x01]), DetectedFormat::Unknown);
    }
}
