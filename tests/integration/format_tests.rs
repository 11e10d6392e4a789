//! Format integration tests.
//!
//! Tests verify:
//! - GeoTIFF written by the crate decodes to the same pixels in both byte orders
//! - LZW with predictor round-trips through the decoder
//! - Full RPF frames decode to the colours their lookup tables select

use raster_tiler::format::rpf::{decode_frame, read_coverage};
use raster_tiler::format::tiff::lzw;
use raster_tiler::io::MemoryRangeReader;
use raster_tiler::{ByteOrder, ElementData, Sector, TiffDecoder, TiffError};

use super::test_utils::{i16_geotiff, rgb_geotiff, rpf_frame};

fn decoder_input(bytes: Vec<u8>) -> MemoryRangeReader {
    MemoryRangeReader::new(bytes, "fixture.tif")
}

// =============================================================================
// TIFF
// =============================================================================

#[tokio::test]
async fn test_rgb_tiff_decodes_in_both_byte_orders() {
    let sector = Sector::new(10.0, 12.0, 20.0, 24.0);
    for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
        let pixels: Vec<u8> = (0..4 * 2 * 3).map(|i| i as u8 * 7).collect();
        let bytes = raster_tiler::GeoTiffWriter::new(order)
            .encode(4, 2, 3, &ElementData::U8(pixels.clone()), Some(&sector), None)
            .unwrap();

        let decoder = TiffDecoder::open(decoder_input(bytes)).await.unwrap();
        assert_eq!(decoder.byte_order(), order);
        assert_eq!(decoder.dimensions(0).await.unwrap(), (4, 2));

        let image = decoder.decode(0).await.unwrap();
        assert_eq!(image.bands, 3);
        assert_eq!(image.data, ElementData::U8(pixels));

        let geo = decoder.geo_reference(0).await.unwrap().unwrap();
        assert_eq!(geo.affine().unwrap().sector(4, 2), sector);
    }
}

#[tokio::test]
async fn test_lzw_int16_with_nodata() {
    let sector = Sector::new(-1.0, 0.0, -1.0, 0.0);
    let values: Vec<i16> = (0..64 * 3).map(|i| (i as i16 - 50) * 13).collect();
    let bytes = i16_geotiff(64, 3, &values, &sector, Some(-32768.0), ByteOrder::BigEndian);

    let decoder = TiffDecoder::open(decoder_input(bytes)).await.unwrap();
    let info = decoder.image_info(0).await.unwrap();
    assert_eq!(info.predictor, 2);

    let image = decoder.decode(0).await.unwrap();
    assert_eq!(image.data, ElementData::I16(values));
    assert_eq!(decoder.nodata(0).await.unwrap(), Some(-32768.0));
}

#[tokio::test]
async fn test_plain_rgb_has_no_geo_reference() {
    let bytes = rgb_geotiff(2, 2, [1, 2, 3], None);
    let decoder = TiffDecoder::open(decoder_input(bytes)).await.unwrap();
    assert_eq!(decoder.geo_reference(0).await.unwrap(), None);
    let rgba = decoder.decode(0).await.unwrap().to_rgba().unwrap();
    assert_eq!(rgba.get_pixel(1, 1).0, [1, 2, 3, 255]);
}

#[tokio::test]
async fn test_truncated_file() {
    let mut bytes = rgb_geotiff(2, 2, [1, 2, 3], None);
    bytes.truncate(6);
    assert!(matches!(
        TiffDecoder::open(decoder_input(bytes)).await,
        Err(TiffError::FileTooSmall { .. })
    ));
}

#[test]
fn test_lzw_round_trip_of_repetitive_data() {
    let input: Vec<u8> = b"TOBEORNOTTOBEORTOBEORNOT".repeat(400);
    let encoded = lzw::encode(&input);
    assert!(encoded.len() < input.len());
    assert_eq!(lzw::decode(&encoded, input.len()).unwrap(), input);
}

// =============================================================================
// RPF
// =============================================================================

#[test]
fn test_rpf_frame_decodes_solid_colour() {
    let coverage = Sector::new(30.0, 31.0, -100.0, -98.5);
    let bytes = rpf_frame([200, 100, 50], Some(&coverage));

    assert_eq!(read_coverage(&bytes).unwrap(), Some(coverage));

    let frame = decode_frame(&bytes).unwrap();
    assert_eq!(frame.coverage, Some(coverage));
    assert_eq!(frame.image.dimensions(), (1536, 1536));
    for (x, y) in [(0, 0), (767, 1000), (1535, 1535)] {
        assert_eq!(frame.image.get_pixel(x, y).0, [200, 100, 50, 255]);
    }
}

#[test]
fn test_rpf_frame_without_coverage() {
    let bytes = rpf_frame([9, 9, 9], None);
    assert_eq!(read_coverage(&bytes).unwrap(), None);
    assert_eq!(decode_frame(&bytes).unwrap().coverage, None);
}
