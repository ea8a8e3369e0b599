// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! RIFF/WAVE decoding for instrument samples.
//!
//! Samples are decoded straight to interleaved stereo 16-bit frames. Unlike a
//! general purpose reader this one also understands the `smpl` chunk, since the
//! first sample loop decides how much of the file is kept. Other chunks, `cue `
//! included, are skipped.

use std::fs;
use std::path::Path;

/// Frames kept past the end of the first loop so interpolation can read ahead.
const LOOP_GUARD_FRAMES: usize = 2;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Error types for sample decoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file does not start with a RIFF header")]
    NotRiff,

    #[error("RIFF container is not a WAVE file")]
    NotWave,

    #[error("missing {0} chunk")]
    MissingChunk(&'static str),

    #[error("data chunk appears before fmt chunk")]
    DataBeforeFormat,

    #[error("{chunk} chunk is truncated")]
    Truncated { chunk: String },

    #[error("unsupported sample format (format tag {tag:#06x}, {bits} bits, {channels} channels)")]
    UnsupportedFormat { tag: u16, bits: u16, channels: u16 },
}

/// A sample loop region from the `smpl` chunk, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLoop {
    pub start: u32,
    pub end: u32,
}

/// The result of decoding a WAVE file.
#[derive(Debug, Clone)]
pub struct DecodedWav {
    /// Interleaved stereo 16-bit frames.
    pub frames: Vec<i16>,
    /// The frame the first loop starts on, if the file defines one.
    pub loop_start: Option<usize>,
}

impl DecodedWav {
    /// Returns the number of stereo frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len() / 2
    }
}

/// The parts of the fmt chunk that matter for decoding.
#[derive(Debug, Clone, Copy)]
struct Format {
    channels: u16,
    bits_per_sample: u16,
}

impl Format {
    fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// Decodes the WAVE file at the given path.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<DecodedWav, DecodeError> {
    decode(&fs::read(path)?)
}

/// Decodes an in-memory WAVE file.
pub fn decode(bytes: &[u8]) -> Result<DecodedWav, DecodeError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" {
        return Err(DecodeError::NotRiff);
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(DecodeError::NotWave);
    }

    let mut format: Option<Format> = None;
    let mut data: Option<&[u8]> = None;
    let mut loops = Vec::new();

    let mut offset = 12;
    // Anything shorter than a chunk header at the end of the file is ignored.
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;
        let body_start = offset + 8;
        let body_end = body_start
            .checked_add(size)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| DecodeError::Truncated {
                chunk: String::from_utf8_lossy(id).into_owned(),
            })?;
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => format = Some(parse_format(body)?),
            b"data" => {
                if format.is_none() {
                    return Err(DecodeError::DataBeforeFormat);
                }
                data = Some(body);
            }
            b"smpl" => loops = parse_smpl(body)?,
            _ => {}
        }

        // Chunks are word aligned.
        offset = body_end + (size & 1);
    }

    let format = format.ok_or(DecodeError::MissingChunk("fmt"))?;
    let data = data.ok_or(DecodeError::MissingChunk("data"))?;

    let available_frames = data.len() / format.bytes_per_frame();
    let (loop_start, frame_count) = match loops.first() {
        Some(first) => (
            Some(first.start as usize),
            (first.end as usize + LOOP_GUARD_FRAMES).min(available_frames),
        ),
        None => (None, available_frames),
    };

    let frames = frames_to_stereo(
        &data[..frame_count * format.bytes_per_frame()],
        format.bits_per_sample,
        format.channels,
    );

    Ok(DecodedWav {
        frames,
        loop_start,
    })
}

fn parse_format(body: &[u8]) -> Result<Format, DecodeError> {
    if body.len() < 16 {
        return Err(DecodeError::Truncated {
            chunk: "fmt ".to_string(),
        });
    }

    let tag = read_u16(body, 0);
    let channels = read_u16(body, 2);
    let bits_per_sample = read_u16(body, 14);

    let supported_tag = tag == WAVE_FORMAT_PCM || tag == WAVE_FORMAT_EXTENSIBLE;
    let supported_bits = bits_per_sample == 16 || bits_per_sample == 24;
    let supported_channels = channels == 1 || channels == 2;
    if !(supported_tag && supported_bits && supported_channels) {
        return Err(DecodeError::UnsupportedFormat {
            tag,
            bits: bits_per_sample,
            channels,
        });
    }

    Ok(Format {
        channels,
        bits_per_sample,
    })
}

fn parse_smpl(body: &[u8]) -> Result<Vec<SampleLoop>, DecodeError> {
    let truncated = || DecodeError::Truncated {
        chunk: "smpl".to_string(),
    };
    if body.len() < 36 {
        return Err(truncated());
    }

    let count = read_u32(body, 28) as usize;
    let needed = count.checked_mul(24).and_then(|n| n.checked_add(36));
    if needed.map_or(true, |needed| needed > body.len()) {
        return Err(truncated());
    }

    // Each loop: cue point id, type, start, end, fraction, play count.
    Ok((0..count)
        .map(|i| {
            let base = 36 + i * 24;
            SampleLoop {
                start: read_u32(body, base + 8),
                end: read_u32(body, base + 12),
            }
        })
        .collect())
}

/// Converts raw PCM frames to interleaved stereo 16-bit samples.
///
/// 24-bit samples keep their two most significant bytes. Mono samples are
/// repeated into both channels.
fn frames_to_stereo(data: &[u8], bits_per_sample: u16, channels: u16) -> Vec<i16> {
    let samples: Vec<i16> = match bits_per_sample {
        24 => data
            .chunks_exact(3)
            .map(|b| i16::from_le_bytes([b[1], b[2]]))
            .collect(),
        _ => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect(),
    };

    if channels == 1 {
        samples.iter().flat_map(|&s| [s, s]).collect()
    } else {
        samples
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a WAVE file in memory from raw chunks.
    pub(crate) fn riff(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut body = b"WAVE".to_vec();
        for (id, data) in chunks {
            body.extend_from_slice(*id);
            body.extend_from_slice(&(data.len() as u32).to_le_bytes());
            body.extend_from_slice(data);
            if data.len() % 2 == 1 {
                body.push(0);
            }
        }
        let mut file = b"RIFF".to_vec();
        file.extend_from_slice(&(body.len() as u32).to_le_bytes());
        file.extend_from_slice(&body);
        file
    }

    pub(crate) fn fmt_chunk(channels: u16, bits: u16) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        fmt.extend_from_slice(&channels.to_le_bytes());
        fmt.extend_from_slice(&44100u32.to_le_bytes());
        fmt.extend_from_slice(&(44100 * block_align as u32).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());
        fmt
    }

    pub(crate) fn smpl_chunk(loops: &[(u32, u32)]) -> Vec<u8> {
        let mut smpl = vec![0u8; 28];
        smpl.extend_from_slice(&(loops.len() as u32).to_le_bytes());
        smpl.extend_from_slice(&0u32.to_le_bytes());
        for (i, (start, end)) in loops.iter().enumerate() {
            for value in [i as u32, 0, *start, *end, 0, 0] {
                smpl.extend_from_slice(&value.to_le_bytes());
            }
        }
        smpl
    }

    pub(crate) fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_stereo_16() {
        let file = riff(&[
            (b"fmt ", fmt_chunk(2, 16)),
            (b"data", pcm16(&[1, -1, 2, -2, 3, -3])),
        ]);
        let decoded = decode(&file).unwrap();
        assert_eq!(decoded.frames, vec![1, -1, 2, -2, 3, -3]);
        assert_eq!(decoded.frame_count(), 3);
        assert_eq!(decoded.loop_start, None);
    }

    #[test]
    fn test_decode_mono_is_duplicated() {
        let file = riff(&[(b"fmt ", fmt_chunk(1, 16)), (b"data", pcm16(&[10, 20, 30]))]);
        let decoded = decode(&file).unwrap();
        assert_eq!(decoded.frames, vec![10, 10, 20, 20, 30, 30]);
    }

    #[test]
    fn test_decode_24_bit_keeps_top_bytes() {
        // Two stereo frames of (0x00, 0x01, 0x80) little-endian.
        let data = [0x00, 0x01, 0x80].repeat(4);
        let file = riff(&[(b"fmt ", fmt_chunk(2, 24)), (b"data", data)]);
        let decoded = decode(&file).unwrap();
        assert_eq!(decoded.frames, vec![0x8001u16 as i16; 4]);
        assert_eq!(decoded.frames[0], -32767);
    }

    #[test]
    fn test_decode_loop_truncates_tail() {
        let samples: Vec<i16> = (0..200).collect();
        let file = riff(&[
            (b"fmt ", fmt_chunk(2, 16)),
            (b"data", pcm16(&samples)),
            (b"smpl", smpl_chunk(&[(10, 40), (50, 60)])),
        ]);
        let decoded = decode(&file).unwrap();
        assert_eq!(decoded.loop_start, Some(10));
        // Loop end plus two guard frames.
        assert_eq!(decoded.frame_count(), 42);
        assert_eq!(decoded.frames[..4], [0, 1, 2, 3]);
    }

    #[test]
    fn test_decode_loop_end_past_data_is_clamped() {
        let file = riff(&[
            (b"fmt ", fmt_chunk(2, 16)),
            (b"data", pcm16(&[0; 20])),
            (b"smpl", smpl_chunk(&[(2, 100)])),
        ]);
        let decoded = decode(&file).unwrap();
        assert_eq!(decoded.frame_count(), 10);
        assert_eq!(decoded.loop_start, Some(2));
    }

    #[test]
    fn test_decode_ignores_cue_chunk() {
        let mut cue = 2u32.to_le_bytes().to_vec();
        for offset in [100u32, 200] {
            for value in [1u32, 0, 0, 0, 0, offset] {
                cue.extend_from_slice(&value.to_le_bytes());
            }
        }
        let file = riff(&[
            (b"fmt ", fmt_chunk(2, 16)),
            (b"cue ", cue),
            (b"data", pcm16(&[0; 20])),
            (b"smpl", smpl_chunk(&[(3, 6)])),
        ]);
        let decoded = decode(&file).unwrap();
        // Only the smpl chunk places the loop.
        assert_eq!(decoded.loop_start, Some(3));
        assert_eq!(decoded.frame_count(), 8);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(b"nope"), Err(DecodeError::NotRiff)));

        let mut not_wave = riff(&[]);
        not_wave[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(decode(&not_wave), Err(DecodeError::NotWave)));

        let no_data = riff(&[(b"fmt ", fmt_chunk(2, 16))]);
        assert!(matches!(
            decode(&no_data),
            Err(DecodeError::MissingChunk("data"))
        ));

        let data_first = riff(&[(b"data", pcm16(&[0, 0])), (b"fmt ", fmt_chunk(2, 16))]);
        assert!(matches!(
            decode(&data_first),
            Err(DecodeError::DataBeforeFormat)
        ));

        let mut truncated = riff(&[(b"fmt ", fmt_chunk(2, 16)), (b"data", pcm16(&[0; 8]))]);
        truncated.truncate(truncated.len() - 4);
        assert!(matches!(
            decode(&truncated),
            Err(DecodeError::Truncated { .. })
        ));

        let eight_bit = riff(&[(b"fmt ", fmt_chunk(1, 8)), (b"data", vec![0; 4])]);
        assert!(matches!(
            decode(&eight_bit),
            Err(DecodeError::UnsupportedFormat { bits: 8, .. })
        ));
    }

    #[test]
    fn test_decode_hound_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("60.wav");
        let mut writer = hound::WavWriter::create(
            &path,
            hound::WavSpec {
                channels: 1,
                sample_rate: 44100,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
        )
        .unwrap();
        for sample in [100i16, -100, 200] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.frames, vec![100, 100, -100, -100, 200, 200]);
    }
}
