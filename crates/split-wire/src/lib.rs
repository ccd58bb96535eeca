#![forbid(unsafe_code)]
//! Binary wire codec (part of C6): the device inference-result payload and
//! the RGB565 diagnostic frame. All multi-byte numeric fields in the
//! device report are little-endian; this is a contract with the device
//! firmware and must be byte-exact.

use split_core::{ClientId, CoreError};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("payload too short: need at least {need} bytes for {field}, have {have}")]
    Truncated { field: &'static str, need: usize, have: usize },

    #[error("client_id field is not valid ASCII")]
    InvalidClientIdBytes,

    #[error("client_id field failed validation")]
    InvalidClientId(#[from] CoreError),

    #[error("message_id field is not valid ASCII")]
    InvalidMessageId,

    #[error("times_size is negative ({0})")]
    NegativeTimesSize(i32),

    #[error("activation_size {0} is not a multiple of 4")]
    UnalignedActivationSize(u32),

    #[error("times_size {0} is not a multiple of 4")]
    UnalignedTimesSize(i32),

    #[error("frame has {have} bytes, expected exactly {need} for a {height}x{width} RGB565 frame")]
    FrameSizeMismatch { have: usize, need: usize, height: u32, width: u32 },
}

const OFFSET_TIMESTAMP: usize = 0;
const OFFSET_CLIENT_ID: usize = 8;
const CLIENT_ID_FIELD_LEN: usize = 9;
const OFFSET_MESSAGE_ID: usize = 17;
const MESSAGE_ID_LEN: usize = 4;
const OFFSET_K: usize = 21;
const OFFSET_ACTIVATION_SIZE: usize = 25;
const OFFSET_ACTIVATION: usize = 29;

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport {
    /// Seconds since Unix epoch, device-adjusted by NTP offset.
    pub timestamp: f64,
    pub client_id: ClientId,
    pub message_id: String,
    /// Raw wire value of `k`: `-1` means local-only. Converted to
    /// `split_core::SplitIndex` by the caller, which knows the model's
    /// layer count.
    pub k_raw: i32,
    pub activation: Vec<f32>,
    pub per_layer_device_times: Vec<f32>,
}

fn require_len(buf: &[u8], at: usize, len: usize, field: &'static str) -> Result<(), WireError> {
    if buf.len() < at + len {
        return Err(WireError::Truncated { field, need: at + len, have: buf.len() });
    }
    Ok(())
}

/// Parses the device's binary inference-result payload, per the layout
/// fixed in this component's external-interfaces contract.
pub fn parse_device_report(buf: &[u8]) -> Result<DeviceReport, WireError> {
    require_len(buf, OFFSET_TIMESTAMP, 8, "timestamp")?;
    let timestamp = f64::from_le_bytes(buf[0..8].try_into().unwrap());

    require_len(buf, OFFSET_CLIENT_ID, CLIENT_ID_FIELD_LEN, "client_id")?;
    let client_id_bytes = &buf[OFFSET_CLIENT_ID..OFFSET_CLIENT_ID + CLIENT_ID_FIELD_LEN];
    let client_id_str =
        std::str::from_utf8(client_id_bytes).map_err(|_| WireError::InvalidClientIdBytes)?;
    let client_id = ClientId::new(client_id_str.trim_end_matches('\0'))?;

    require_len(buf, OFFSET_MESSAGE_ID, MESSAGE_ID_LEN, "message_id")?;
    let message_id_bytes = &buf[OFFSET_MESSAGE_ID..OFFSET_MESSAGE_ID + MESSAGE_ID_LEN];
    let message_id =
        std::str::from_utf8(message_id_bytes).map_err(|_| WireError::InvalidMessageId)?.to_string();

    require_len(buf, OFFSET_K, 4, "k")?;
    let k_raw = i32::from_le_bytes(buf[OFFSET_K..OFFSET_K + 4].try_into().unwrap());

    require_len(buf, OFFSET_ACTIVATION_SIZE, 4, "activation_size")?;
    let activation_size =
        u32::from_le_bytes(buf[OFFSET_ACTIVATION_SIZE..OFFSET_ACTIVATION_SIZE + 4].try_into().unwrap());
    if activation_size % 4 != 0 {
        return Err(WireError::UnalignedActivationSize(activation_size));
    }

    require_len(buf, OFFSET_ACTIVATION, activation_size as usize, "activation")?;
    let activation_end = OFFSET_ACTIVATION + activation_size as usize;
    let activation = read_f32_vec(&buf[OFFSET_ACTIVATION..activation_end]);

    let offset_times_size = activation_end;
    require_len(buf, offset_times_size, 4, "times_size")?;
    let times_size = i32::from_le_bytes(buf[offset_times_size..offset_times_size + 4].try_into().unwrap());
    if times_size < 0 {
        return Err(WireError::NegativeTimesSize(times_size));
    }
    if times_size % 4 != 0 {
        return Err(WireError::UnalignedTimesSize(times_size));
    }

    let offset_times = offset_times_size + 4;
    require_len(buf, offset_times, times_size as usize, "per_layer_times")?;
    let times_end = offset_times + times_size as usize;
    let per_layer_device_times = read_f32_vec(&buf[offset_times..times_end]);

    Ok(DeviceReport { timestamp, client_id, message_id, k_raw, activation, per_layer_device_times })
}

fn read_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect()
}

/// Unpacks an RGB565 diagnostic frame (`H*W` big-endian uint16 pixels)
/// into 8-bit-per-channel RGB triples.
pub fn decode_rgb565_frame(buf: &[u8], height: u32, width: u32) -> Result<Vec<[u8; 3]>, WireError> {
    let pixel_count = (height as usize) * (width as usize);
    let need = pixel_count * 2;
    if buf.len() != need {
        return Err(WireError::FrameSizeMismatch { have: buf.len(), need, height, width });
    }
    Ok(buf
        .chunks_exact(2)
        .map(|c| {
            let pixel = u16::from_be_bytes([c[0], c[1]]);
            let r5 = (pixel >> 11) & 0x1F;
            let g6 = (pixel >> 5) & 0x3F;
            let b5 = pixel & 0x1F;
            let r = ((r5 as u32 * 255) / 31) as u8;
            let g = ((g6 as u32 * 255) / 63) as u8;
            let b = ((b5 as u32 * 255) / 31) as u8;
            [r, g, b]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_report_bytes(timestamp: f64, client_id: &str, message_id: &str, k: i32, activation: &[f32], times: &[f32]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&timestamp.to_le_bytes());
        let mut client_id_field = [0u8; CLIENT_ID_FIELD_LEN];
        client_id_field[..client_id.len()].copy_from_slice(client_id.as_bytes());
        buf.extend_from_slice(&client_id_field);
        let mut message_id_field = [0u8; MESSAGE_ID_LEN];
        message_id_field[..message_id.len()].copy_from_slice(message_id.as_bytes());
        buf.extend_from_slice(&message_id_field);
        buf.extend_from_slice(&k.to_le_bytes());
        let activation_bytes: Vec<u8> = activation.iter().flat_map(|f| f.to_le_bytes()).collect();
        buf.extend_from_slice(&(activation_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&activation_bytes);
        let times_bytes: Vec<u8> = times.iter().flat_map(|f| f.to_le_bytes()).collect();
        buf.extend_from_slice(&(times_bytes.len() as i32).to_le_bytes());
        buf.extend_from_slice(&times_bytes);
        buf
    }

    #[test]
    fn round_trips_a_well_formed_report() {
        let bytes = build_report_bytes(1_700_000_000.5, "dev-1", "ab12", -1, &[1.0, 2.0, 3.0], &[0.01, 0.02]);
        let report = parse_device_report(&bytes).unwrap();
        assert_eq!(report.timestamp, 1_700_000_000.5);
        assert_eq!(report.client_id.as_str(), "dev-1");
        assert_eq!(report.message_id, "ab12");
        assert_eq!(report.k_raw, -1);
        assert_eq!(report.activation, vec![1.0, 2.0, 3.0]);
        assert_eq!(report.per_layer_device_times, vec![0.01, 0.02]);
    }

    #[test]
    fn nul_padded_client_id_is_trimmed() {
        let bytes = build_report_bytes(0.0, "ab", "msg1", 5, &[], &[]);
        let report = parse_device_report(&bytes).unwrap();
        assert_eq!(report.client_id.as_str(), "ab");
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = vec![0u8; 10];
        assert!(matches!(parse_device_report(&bytes), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn unaligned_activation_size_is_rejected() {
        let mut bytes = build_report_bytes(0.0, "a", "msg1", 0, &[1.0], &[]);
        // corrupt activation_size to 3 (not a multiple of 4)
        bytes[OFFSET_ACTIVATION_SIZE..OFFSET_ACTIVATION_SIZE + 4].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(parse_device_report(&bytes), Err(WireError::UnalignedActivationSize(3))));
    }

    #[test]
    fn decodes_solid_red_frame() {
        // R=31 (max 5 bits), G=0, B=0 -> pixel = 0b11111_000000_00000 = 0xF800
        let pixel: u16 = 0xF800;
        let buf = pixel.to_be_bytes().repeat(4); // 2x2 frame
        let pixels = decode_rgb565_frame(&buf, 2, 2).unwrap();
        assert_eq!(pixels.len(), 4);
        for p in pixels {
            assert_eq!(p, [255, 0, 0]);
        }
    }

    #[test]
    fn rejects_mismatched_frame_size() {
        let buf = vec![0u8; 7];
        assert!(matches!(
            decode_rgb565_frame(&buf, 2, 2),
            Err(WireError::FrameSizeMismatch { .. })
        ));
    }
}
