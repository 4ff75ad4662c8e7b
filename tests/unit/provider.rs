use super::*;

fn with_block(w: u32, h: u32, x0: u32, y0: u32, bw: u32, bh: u32) -> Bitmap {
    let mut data = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let inside = (x0..x0 + bw).contains(&x) && (y0..y0 + bh).contains(&y);
            let px: [u8; 4] = if inside { [200, 0, 0, 255] } else { [0; 4] };
            data.extend_from_slice(&px);
        }
    }
    Bitmap::from_rgba8(w, h, data).unwrap()
}

#[test]
fn autocrop_trims_transparent_borders() {
    let cropped = autocrop(&with_block(10, 8, 2, 3, 4, 2)).unwrap();
    assert_eq!((cropped.width(), cropped.height()), (4, 2));
    assert!(cropped.data().chunks_exact(4).all(|px| px == [200, 0, 0, 255]));
}

#[test]
fn autocrop_finds_content_touching_the_origin() {
    let cropped = autocrop(&with_block(10, 6, 0, 0, 4, 3)).unwrap();
    assert_eq!((cropped.width(), cropped.height()), (4, 3));
}

#[test]
fn autocrop_ignores_color_of_transparent_pixels() {
    let mut data = Vec::new();
    for y in 0..5u32 {
        for x in 0..7u32 {
            let px: [u8; 4] = match (x, y) {
                (3, 2) => [1, 2, 3, 128],
                _ => [(x * 30) as u8, (y * 40) as u8, 255, 0],
            };
            data.extend_from_slice(&px);
        }
    }
    let cropped = autocrop(&Bitmap::from_rgba8(7, 5, data).unwrap()).unwrap();
    assert_eq!((cropped.width(), cropped.height()), (1, 1));
    assert_eq!(cropped.pixel(0, 0), Some([1, 2, 3, 128]));
}

#[test]
fn autocrop_keeps_opaque_and_fully_transparent_bitmaps() {
    let flat = Bitmap::filled(ImageSize::new(3, 3).unwrap(), [9, 9, 9, 255]);
    assert_eq!(autocrop(&flat).unwrap(), flat);

    let clear = Bitmap::filled(ImageSize::new(4, 2).unwrap(), [255, 255, 255, 0]);
    assert_eq!(autocrop(&clear).unwrap(), clear);
}

#[test]
fn session_dedups_layers_and_stacks_in_first_seen_order() {
    let cmd = |m: &str| RenderCmd::new(["d.rast", &format!("map={m}")]).unwrap();
    let mut session = Session::default();
    session.composites = vec![
        CompositeRequest::new(vec![cmd("a"), cmd("b")], vec![1.0, 1.0], None).unwrap(),
        CompositeRequest::new(vec![cmd("c"), cmd("a")], vec![1.0, 1.0], None).unwrap(),
        CompositeRequest::new(vec![cmd("a"), cmd("b")], vec![1.0, 1.0], None).unwrap(),
    ];
    session.views_3d = vec![RenderRequest::new(
        RenderCmd::new(["m.nviz.image", "elevation_map=elev"]).unwrap(),
        None,
    )];
    session.recompute_unique();

    let maps = session
        .render_requests()
        .iter()
        .map(|r| r.cmd().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        maps,
        vec![
            "d.rast map=a",
            "d.rast map=b",
            "d.rast map=c",
            "m.nviz.image elevation_map=elev"
        ]
    );
    assert_eq!(session.unique_stacks().len(), 2);
}

#[test]
fn view_keys_are_distinct_from_layer_keys() {
    let cmd = RenderCmd::new(["m.nviz.image", "elevation_map=elev"]).unwrap();
    assert_ne!(view_key(&cmd), hash_cmd(&cmd, None));
    assert_eq!(view_key(&cmd), hash_cmds(&[cmd.clone()], None));
}

#[test]
fn opts_deserialize_with_defaults() {
    let opts: LoadOpts = serde_json::from_str(r#"{"nprocs": 2}"#).unwrap();
    assert_eq!(opts.nprocs, 2);
    assert!(!opts.force);
    assert_eq!(opts.bgcolor, Rgb8::WHITE);

    let opts: ProviderOpts =
        serde_json::from_str(r#"{"size": {"width": 10, "height": 5}}"#).unwrap();
    assert_eq!(opts.size, ImageSize::new(10, 5).unwrap());
    assert_eq!(opts.scratch_dir, None);
}
