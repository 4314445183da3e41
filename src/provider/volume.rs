use super::AudioProvider;
use crate::{
    constants::I16_SAMPLE_BYTES,
    error::{Error, Result},
};
use byteorder::{ByteOrder, LittleEndian};

/// Reads from `provider`, then scales each little-endian `i16` value in the
/// valid prefix by `volume`, saturating at the limits of `i16`.
#[allow(clippy::float_cmp)]
pub(crate) fn read_with_volume<P: AudioProvider + ?Sized>(
    provider: &P,
    buf: &mut [u8],
    start: u64,
    count: u64,
    volume: f64,
) -> Result<u64> {
    if volume == 1.0 {
        return provider.read(buf, start, count);
    }

    let format = provider.format();
    if format.float || format.bytes_per_sample != I16_SAMPLE_BYTES {
        return Err(Error::UnsupportedFormat);
    }

    let valid = provider.read(buf, start, count)?;
    let len = format.byte_len(valid);

    for value in buf[..len].chunks_exact_mut(I16_SAMPLE_BYTES as usize) {
        let scaled = f64::from(LittleEndian::read_i16(value)) * volume;
        let scaled = scaled
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;

        LittleEndian::write_i16(value, scaled);
    }

    Ok(valid)
}
