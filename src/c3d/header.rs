//! Fixed-size C3D header record (the first 512-byte block).

use super::C3dError;

/// Fields pulled out of the 512-byte header block. Only the fields the
/// rest of the pipeline actually needs are kept — the C3D header also
/// carries 3D-point scaling/range metadata that this pipeline never
/// touches (no point data, only analog/EMG channels).
#[derive(Debug, Clone, Copy)]
pub struct RawHeader {
    pub parameter_block_count: u8,
    pub point_count: u16,
    pub analog_measurements_per_frame: u16,
    pub first_frame: u16,
    pub last_frame: u16,
    pub analog_samples_per_frame: u16,
    pub frame_rate_hz: f32,
    pub data_start_block: u16,
}

impl RawHeader {
    pub fn analog_channel_count(&self) -> u16 {
        if self.analog_samples_per_frame == 0 {
            0
        } else {
            self.analog_measurements_per_frame / self.analog_samples_per_frame
        }
    }

    pub fn analog_sampling_rate_hz(&self) -> f64 {
        f64::from(self.frame_rate_hz) * f64::from(self.analog_samples_per_frame)
    }
}

fn read_u16le(buf: &[u8], offset: usize) -> Result<u16, C3dError> {
    let bytes: [u8; 2] = buf
        .get(offset..offset + 2)
        .ok_or(C3dError::CorruptFile {
            reason: format!("header truncated at offset {offset}"),
        })?
        .try_into()
        .expect("slice of len 2");
    Ok(u16::from_le_bytes(bytes))
}

fn read_f32le(buf: &[u8], offset: usize) -> Result<f32, C3dError> {
    let bytes: [u8; 4] = buf
        .get(offset..offset + 4)
        .ok_or(C3dError::CorruptFile {
            reason: format!("header truncated at offset {offset}"),
        })?
        .try_into()
        .expect("slice of len 4");
    Ok(f32::from_le_bytes(bytes))
}

/// Parse the 512-byte header block. `block` must be at least 512 bytes
/// (callers pass the full file and this reads the leading block).
pub fn parse_header(block: &[u8]) -> Result<RawHeader, C3dError> {
    if block.len() < 512 {
        return Err(C3dError::CorruptFile {
            reason: format!("file too short for header block: {} bytes", block.len()),
        });
    }

    let parameter_block_count = block[0];
    let magic = block[1];
    if magic != 0x50 {
        return Err(C3dError::CorruptFile {
            reason: format!("bad magic byte: expected 0x50, found {magic:#04x}"),
        });
    }

    let point_count = read_u16le(block, 2)?;
    let analog_measurements_per_frame = read_u16le(block, 4)?;
    let first_frame = read_u16le(block, 6)?;
    let last_frame = read_u16le(block, 8)?;
    let data_start_block = read_u16le(block, 16)?;
    let analog_samples_per_frame = read_u16le(block, 18)?;
    let frame_rate_hz = read_f32le(block, 20)?;

    Ok(RawHeader {
        parameter_block_count,
        point_count,
        analog_measurements_per_frame,
        first_frame,
        last_frame,
        analog_samples_per_frame,
        frame_rate_hz,
        data_start_block,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_header(frame_rate: f32, samples_per_frame: u16, channels: u16) -> Vec<u8> {
        let mut block = vec![0u8; 512];
        block[0] = 2; // parameter block count
        block[1] = 0x50;
        block[2..4].copy_from_slice(&0u16.to_le_bytes()); // point_count
        block[4..6].copy_from_slice(&(channels * samples_per_frame).to_le_bytes());
        block[6..8].copy_from_slice(&1u16.to_le_bytes());
        block[8..10].copy_from_slice(&1000u16.to_le_bytes());
        block[16..18].copy_from_slice(&3u16.to_le_bytes());
        block[18..20].copy_from_slice(&samples_per_frame.to_le_bytes());
        block[20..24].copy_from_slice(&frame_rate.to_le_bytes());
        block
    }

    #[test]
    fn rejects_bad_magic() {
        let mut block = fixture_header(1000.0, 1, 2);
        block[1] = 0x00;
        assert!(matches!(
            parse_header(&block),
            Err(C3dError::CorruptFile { .. })
        ));
    }

    #[test]
    fn rejects_truncated_file() {
        let short = vec![0u8; 100];
        assert!(matches!(
            parse_header(&short),
            Err(C3dError::CorruptFile { .. })
        ));
    }

    #[test]
    fn derives_analog_channel_count_and_rate() {
        let block = fixture_header(1000.0, 1, 2);
        let header = parse_header(&block).unwrap();
        assert_eq!(header.analog_channel_count(), 2);
        assert_eq!(header.analog_sampling_rate_hz(), 1000.0);
    }
}
