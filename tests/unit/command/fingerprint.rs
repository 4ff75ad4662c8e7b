use super::*;

fn cmd(argv: &[&str]) -> RenderCmd {
    RenderCmd::new(argv.iter().copied()).unwrap()
}

#[test]
fn equal_commands_produce_equal_keys() {
    let a = cmd(&["d.rast", "map=elev_2001"]);
    let b = cmd(&["d.rast", "map=elev_2001"]);
    assert_eq!(hash_cmd(&a, None), hash_cmd(&b, None));
    assert_ne!(hash_cmd(&a, None), hash_cmd(&cmd(&["d.rast", "map=elev_2002"]), None));
}

#[test]
fn region_participates_in_keys() {
    let a = cmd(&["d.rast", "map=elev"]);
    let r1 = Region::new().with("n", "10");
    let r2 = Region::new().with("n", "11");
    assert_ne!(hash_cmd(&a, None), hash_cmd(&a, Some(&r1)));
    assert_ne!(hash_cmd(&a, Some(&r1)), hash_cmd(&a, Some(&r2)));
}

#[test]
fn argument_boundaries_are_not_ambiguous() {
    let a = cmd(&["d.rast", "map=ab"]);
    let b = cmd(&["d.rast", "map=a", "b"]);
    assert_ne!(hash_cmd(&a, None), hash_cmd(&b, None));
}

#[test]
fn domains_are_disjoint() {
    let a = cmd(&["m.nviz.image", "elevation_map=elev"]);
    let one = hash_cmd(&a, None);
    let list = hash_cmds(std::slice::from_ref(&a), None);
    let stack = hash_stack(std::slice::from_ref(&a), &[1.0], None);
    assert_ne!(one, list);
    assert_ne!(list, stack);
    assert_ne!(one, stack);
}

#[test]
fn stack_keys_depend_on_order_and_opacity() {
    let a = cmd(&["d.rast", "map=a"]);
    let b = cmd(&["d.vect", "map=b"]);
    let ab = hash_stack(&[a.clone(), b.clone()], &[1.0, 1.0], None);
    let ba = hash_stack(&[b.clone(), a.clone()], &[1.0, 1.0], None);
    let faded = hash_stack(&[a.clone(), b.clone()], &[1.0, 0.5], None);
    assert_ne!(ab, ba);
    assert_ne!(ab, faded);
    assert_eq!(
        hash_stack(&[a.clone()], &[0.0], None),
        hash_stack(&[a], &[-0.0], None)
    );
}

#[test]
fn keys_never_collide_with_the_sentinel() {
    let k = hash_cmd(&cmd(&["d.rast", "map=a"]), None);
    assert!(!k.is_no_data());
    assert!(CacheKey::NO_DATA.is_no_data());
}

#[test]
fn display_is_fixed_width_hex_and_parses_back() {
    let k = hash_cmd(&cmd(&["d.rast", "map=a"]), None);
    let s = k.to_string();
    assert_eq!(s.len(), 32);
    assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(s.parse::<CacheKey>().unwrap(), k);
    assert!("abc".parse::<CacheKey>().is_err());
    assert_eq!(
        serde_json::to_string(&k).unwrap(),
        format!("\"{s}\"")
    );
}
