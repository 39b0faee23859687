use ruidakit::commands::{decode_file, load_commands, load_moves, render_decode, write_job_file};
use ruidakit::{execute_commands, inspect, CommandKind, Config, DummyLaser, DummyRotary, Move};
use ruidakit_communication::LaserCall;
use tempfile::TempDir;

const MOVES_JSON: &str = r#"[
  {"x": 0.0, "y": 0.0, "speed_mm_s": 150.0, "power_pct": 0.0, "is_cut": false},
  {"x": 40.0, "y": 0.0, "speed_mm_s": 20.0, "power_pct": 60.0, "is_cut": true},
  {"x": 40.0, "y": 25.0, "speed_mm_s": 20.0, "power_pct": 60.0, "is_cut": true, "z": 1.5}
]"#;

#[test]
fn test_load_moves_reads_optional_z() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("moves.json");
    std::fs::write(&path, MOVES_JSON).unwrap();

    let moves = load_moves(&path).unwrap();
    assert_eq!(moves.len(), 3);
    assert_eq!(moves[0], Move::travel(0.0, 0.0, 150.0));
    assert_eq!(moves[1], Move::cut(40.0, 0.0, 20.0, 60.0));
    assert_eq!(moves[2].z, Some(1.5));
}

#[test]
fn test_bad_move_list_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "[{\"x\": 1}]").unwrap();

    let err = load_moves(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("broken.json"));
}

#[test]
fn test_written_job_decodes_back() {
    let dir = TempDir::new().unwrap();
    let moves_path = dir.path().join("moves.json");
    let out = dir.path().join("square.rd");
    std::fs::write(&moves_path, MOVES_JSON).unwrap();

    let config = Config::default();
    let moves = load_moves(&moves_path).unwrap();
    let written = write_job_file(&moves, None, &config, &out).unwrap();
    assert_eq!(std::fs::metadata(&out).unwrap().len() as usize, written);

    let decoded = decode_file(&out, Some(config.connection.magic)).unwrap();
    assert!(decoded.is_clean(), "{:?}", decoded.diagnostics);

    let summary = inspect(&decoded);
    assert!(summary.cuts >= 2);
    assert_eq!(summary.checksum, Some(true));
    let bbox = summary.bbox.expect("bbox").as_array();
    for (got, want) in bbox.iter().zip([0.0, 0.0, 40.0, 25.0]) {
        assert!((got - want).abs() < 1e-3, "{:?}", bbox);
    }

    let text = render_decode(&decoded, true);
    assert!(text.contains("EOF"));
    assert!(!text.contains("diagnostic(s)"));
}

#[test]
fn test_unswizzled_read_of_swizzled_file_is_noisy() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("job.rd");
    let config = Config::default();
    write_job_file(
        &[Move::travel(5.0, 5.0, 100.0), Move::cut(10.0, 5.0, 30.0, 50.0)],
        Some(2.0),
        &config,
        &out,
    )
    .unwrap();

    let raw = decode_file(&out, None).unwrap();
    let clean = decode_file(&out, Some(config.connection.magic)).unwrap();
    assert!(clean.is_clean());
    assert!(raw.commands.len() != clean.commands.len() || !raw.is_clean());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(decode_file(&dir.path().join("absent.rd"), None).is_err());
}

const COMMANDS_JSON: &str = r#"[
  {"kind": "move", "x": 10.0, "y": 5.0, "speed_mm_s": 100.0, "comment": "to start"},
  {"kind": "set_laser_power", "power_pct": 35.0},
  {"kind": "cut_line", "x": 30.0, "y": 5.0, "speed_mm_s": 12.0},
  {"kind": "rotate", "angle_deg": 45.0, "speed_mm_s": 20.0},
  {"kind": "move", "z": -2.0}
]"#;

#[test]
fn test_command_list_runs_against_dummy_drivers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("commands.json");
    std::fs::write(&path, COMMANDS_JSON).unwrap();

    let commands = load_commands(&path).unwrap();
    assert_eq!(commands.len(), 5);
    assert_eq!(commands[0].kind, CommandKind::Move);
    assert_eq!(commands[0].comment, "to start");
    assert_eq!(commands[3].kind, CommandKind::Rotate);

    let mut laser = DummyLaser::new();
    let mut rotary = DummyRotary::new();
    execute_commands(&commands, &mut laser, &mut rotary).unwrap();

    let calls = laser.calls();
    let calls = calls.lock();
    assert_eq!(
        *calls,
        vec![
            LaserCall::Move {
                x: 10.0,
                y: 5.0,
                z: 0.0,
                speed_mm_s: Some(100.0)
            },
            LaserCall::SetLaserPower(35.0),
            LaserCall::CutLine {
                x: 30.0,
                y: 5.0,
                speed_mm_s: 12.0
            },
            LaserCall::Move {
                x: 30.0,
                y: 5.0,
                z: -2.0,
                speed_mm_s: None
            },
        ]
    );
    assert_eq!(rotary.angle_deg, 45.0);
}

#[test]
fn test_bad_command_list_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plan.json");
    std::fs::write(&path, r#"[{"kind": "engrave"}]"#).unwrap();

    let err = load_commands(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("plan.json"));
}

#[test]
fn test_profile_key_is_used_for_written_jobs() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("job.rd");
    let mut config = Config::default();
    config.connection.magic = 0x11;
    config.connection.profile = Some("rdc6442g".to_string());
    write_job_file(&[Move::cut(10.0, 5.0, 30.0, 50.0)], None, &config, &out).unwrap();

    assert!(decode_file(&out, Some(0x88)).unwrap().is_clean());
    assert!(!decode_file(&out, Some(0x11)).unwrap().is_clean());
}
