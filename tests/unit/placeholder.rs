use super::*;

#[test]
fn placeholders_have_the_requested_size_and_are_opaque() {
    let factory = PlaceholderFactory::new();
    let size = ImageSize::new(120, 80).unwrap();
    for bmp in [factory.no_data(size), factory.failed(size)] {
        assert_eq!(bmp.size(), size);
        assert!(bmp.data().chunks_exact(4).all(|px| px[3] == 255));
    }
}

#[test]
fn no_data_and_failed_are_distinguishable() {
    let factory = PlaceholderFactory::new();
    let size = ImageSize::new(64, 64).unwrap();
    let no_data = factory.no_data(size);
    let failed = factory.failed(size);
    assert_ne!(no_data, failed);
    assert_eq!(no_data.pixel(0, 0), Some([255, 255, 255, 255]));
    assert_eq!(failed.pixel(32, 4), Some([255, 240, 240, 255]));
    assert_eq!(failed.pixel(1, 32), Some([176, 48, 48, 255]));
}

#[test]
fn factories_render_identical_bitmaps() {
    let size = ImageSize::new(50, 30).unwrap();
    let a = PlaceholderFactory::new().failed(size);
    let b = PlaceholderFactory::new().failed(size);
    assert_eq!(a, b);
}

#[test]
fn svg_frame_only_for_bordered_placeholders() {
    let size = ImageSize::new(10, 10).unwrap();
    assert!(!placeholder_svg(size, "x", Rgb8::WHITE, None).contains("stroke"));
    let svg = placeholder_svg(size, "x", Rgb8::WHITE, Some(Rgb8::BLACK));
    assert!(svg.contains(r##"stroke="#000000""##));
    assert!(svg.contains(r##"fill="#ffffff""##));
}
