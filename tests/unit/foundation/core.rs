use super::*;

#[test]
fn image_size_rejects_zero_sides() {
    assert!(ImageSize::new(0, 10).is_err());
    assert!(ImageSize::new(10, 0).is_err());
    assert_eq!(ImageSize::new(4, 3).unwrap().pixel_count(), 12);
    assert_eq!(ImageSize::default().to_string(), "640x480");
}

#[test]
fn rgb8_formats_match_driver_conventions() {
    let c = Rgb8::new(13, 156, 230);
    assert_eq!(c.to_hex(), "0d9ce6");
    assert_eq!(c.to_colon(), "13:156:230");
}

#[test]
fn rgb8_parses_common_notations() {
    let c = Rgb8::new(13, 156, 230);
    assert_eq!("13,156,230".parse::<Rgb8>().unwrap(), c);
    assert_eq!("13:156:230".parse::<Rgb8>().unwrap(), c);
    assert_eq!("#0d9ce6".parse::<Rgb8>().unwrap(), c);
    assert_eq!("0D9CE6".parse::<Rgb8>().unwrap(), c);
    assert!("1,2".parse::<Rgb8>().is_err());
    assert!("256,0,0".parse::<Rgb8>().is_err());
    assert!("#12345".parse::<Rgb8>().is_err());
}

#[test]
fn rgb8_serde_uses_triplets() {
    let c: Rgb8 = serde_json::from_str("[1, 2, 3]").unwrap();
    assert_eq!(c, Rgb8::new(1, 2, 3));
    assert_eq!(serde_json::to_string(&c).unwrap(), "[1,2,3]");
}

#[test]
fn bitmap_length_is_checked() {
    assert!(Bitmap::from_rgba8(2, 2, vec![0; 16]).is_ok());
    assert!(Bitmap::from_rgba8(2, 2, vec![0; 15]).is_err());
    assert!(Bitmap::from_rgba8(0, 2, vec![]).is_err());
}

#[test]
fn bitmap_clone_shares_pixels_and_compares_by_value() {
    let a = Bitmap::filled(ImageSize::new(3, 2).unwrap(), [1, 2, 3, 255]);
    let b = a.clone();
    assert_eq!(a, b);
    assert_eq!(b.pixel(2, 1), Some([1, 2, 3, 255]));
    assert_eq!(b.pixel(3, 0), None);
}

#[test]
fn bitmap_crop_copies_the_window() {
    let mut data = Vec::new();
    for y in 0..3u8 {
        for x in 0..3u8 {
            data.extend_from_slice(&[x, y, 0, 255]);
        }
    }
    let bmp = Bitmap::from_rgba8(3, 3, data).unwrap();
    let c = bmp.cropped(1, 1, 2, 5).unwrap();
    assert_eq!(c.size(), ImageSize::new(2, 2).unwrap());
    assert_eq!(c.pixel(0, 0), Some([1, 1, 0, 255]));
    assert_eq!(c.pixel(1, 1), Some([2, 2, 0, 255]));
}
