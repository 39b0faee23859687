use ruidakit_protocol::codec::{swizzle, DEFAULT_MAGIC};
use ruidakit_protocol::{build_job, decode, decode_swizzled, inspect, JobBuilder, Move};

fn labels(payload: &[u8]) -> Vec<String> {
    decode(payload)
        .commands
        .into_iter()
        .map(|c| c.label)
        .collect()
}

#[test]
fn test_negative_coords_and_z_offsets_survive_decoding() {
    let moves = [
        Move::travel(0.0, -10.0, 100.0),
        Move::travel(0.0, -10.0, 5.0).with_z(2.5),
        Move::cut(5.0, 10.0, 20.0, 50.0),
        Move::travel(5.0, 10.0, 5.0).with_z(-1.0),
    ];
    let payload = build_job(&moves, None, true).unwrap();
    let decoded = decode(&payload);
    assert!(decoded.is_clean(), "{:?}", decoded.diagnostics);

    let summary = inspect(&decoded);
    let bbox = summary.bbox.expect("bbox").as_array();
    for (got, want) in bbox.iter().zip([0.0, -10.0, 5.0, 10.0]) {
        assert!((got - want).abs() < 1e-3, "{:?}", bbox);
    }
    let z: Vec<f64> = summary
        .z_offsets
        .iter()
        .map(|z| (z * 1000.0).round() / 1000.0)
        .collect();
    assert_eq!(z, vec![2.5, -3.5]);
}

#[test]
fn test_file_checksum_verifies() {
    let moves = [
        Move::travel(10.0, 10.0, 200.0),
        Move::cut(60.0, 10.0, 30.0, 70.0),
        Move::cut(60.0, 60.0, 30.0, 70.0),
        Move::cut(10.0, 60.0, 15.0, 35.0),
        Move::cut(10.0, 10.0, 15.0, 35.0),
    ];
    let payload = JobBuilder::new()
        .with_filename("SQUARE")
        .build(&moves)
        .unwrap();
    let decoded = decode(&payload);

    assert_eq!(decoded.checksums.len(), 1);
    assert!(decoded.checksums[0].is_ok(), "{:?}", decoded.checksums[0]);
    assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);
    assert_eq!(inspect(&decoded).layers, 2);
}

#[test]
fn test_layout_order() {
    let payload = JobBuilder::new()
        .with_force_absolute_every(0)
        .build(&[Move::travel(0.0, 0.0, 100.0), Move::cut(20.0, 0.0, 25.0, 40.0)])
        .unwrap();
    let labels = labels(&payload);
    let expected_prefix = [
        "SET_ABSOLUTE",
        "PROCESS_TOP_LEFT",
        "PROCESS_BOTTOM_RIGHT",
        "DOCUMENT_TOP_LEFT",
        "DOCUMENT_BOTTOM_RIGHT",
        "ENABLE_BLOCK_CUTTING",
        "SPEED_LASER_1_PART",
        "MIN_POWER_1_PART",
        "MAX_POWER_1_PART",
        "MIN_POWER_2_PART",
        "MAX_POWER_2_PART",
        "MIN_POWER_3_PART",
        "MAX_POWER_3_PART",
        "MIN_POWER_4_PART",
        "MAX_POWER_4_PART",
        "LAYER_COLOR_PART",
        "LAYER_SELECT",
        "PART_TOP_LEFT",
        "PART_BOTTOM_RIGHT",
        "PART_EX_TOP_LEFT",
        "PART_EX_BOTTOM_RIGHT",
        "MAX_LAYER_PART",
        "LAYER_NUMBER_PART",
        "AIR_ASSIST_ON",
        "SPEED_LASER_1",
        "MOVE_ABS_XY",
        "SPEED_LASER_1",
        "MIN_POWER_1",
        "MAX_POWER_1",
        "CUT_ABS_XY",
    ];
    assert_eq!(labels[..expected_prefix.len()], expected_prefix);
    assert_eq!(
        labels[expected_prefix.len()..],
        ["ARRAY_END", "BLOCK_END", "SET_SETTING", "SET_FILE_SUM", "EOF"]
    );
}

#[test]
fn test_zero_power_cut_is_travel() {
    let payload = build_job(
        &[Move::travel(0.0, 0.0, 50.0), Move::cut(1.0, 1.0, 50.0, 0.0)],
        None,
        false,
    )
    .unwrap();
    let summary = inspect(&decode(&payload));
    assert_eq!(summary.cuts, 0);
    assert_eq!(summary.moves, 2);
    assert_eq!(summary.layers, 1);
}

#[test]
fn test_empty_job() {
    assert!(build_job(&[], None, true).unwrap().is_empty());
    assert!(decode(&[]).commands.is_empty());
}

#[test]
fn test_swizzled_file_decodes() {
    let payload = build_job(&[Move::travel(3.0, 4.0, 100.0)], Some(1.5), true).unwrap();
    let decoded = decode_swizzled(&swizzle(&payload, DEFAULT_MAGIC), DEFAULT_MAGIC);
    assert!(decoded.is_clean());
    assert_eq!(inspect(&decoded).z_offsets, vec![1.5]);
}

#[test]
fn test_decode_output_as_json() {
    let moves = [Move::travel(0.0, 0.0, 100.0), Move::cut(5.0, 0.0, 20.0, 30.0)];
    let payload = build_job(&moves, None, true).unwrap();
    let json = serde_json::to_value(decode(&payload)).unwrap();

    let commands = json["commands"].as_array().unwrap();
    assert_eq!(commands[0]["label"], "SET_ABSOLUTE");
    assert_eq!(commands[0]["offset"], 0);
    assert_eq!(commands[0]["is_reply"], false);
    assert_eq!(commands.last().unwrap()["label"], "EOF");
    assert!(json["diagnostics"].as_array().unwrap().is_empty());
    assert_eq!(json["checksums"].as_array().unwrap().len(), 1);
}
