//! Trajectory engine behavior: dispatch, modes, cursor, overrides,
//! closing, and in-memory I/O.

use lin_alg::f64::Vec3;

use mol_files::{Atom, Error, Frame, Mode, Topology, Trajectory, UnitCell};

fn temp(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(name)
}

fn three_frames() -> String {
    let mut content = String::new();
    for step in 0..3 {
        content.push_str(&format!(
            "2\ncomment\nO 0.0 0.0 {step}.0\nH 1.0 0.0 {step}.0\n"
        ));
    }
    content
}

#[test]
fn sequential_reads_and_done() {
    let mut trajectory =
        Trajectory::memory_reader(three_frames().as_bytes(), "XYZ").unwrap();
    assert_eq!(trajectory.nsteps(), 3);
    assert!(!trajectory.done());

    for step in 0..3 {
        let frame = trajectory.read().unwrap();
        assert_eq!(frame.step(), step);
        assert_eq!(frame.positions()[0].z, step as f64);
    }
    assert!(trajectory.done());
    assert!(matches!(trajectory.read(), Err(Error::File(_))));
}

#[test]
fn read_step_positions_the_cursor() {
    let mut trajectory =
        Trajectory::memory_reader(three_frames().as_bytes(), "XYZ").unwrap();

    let frame = trajectory.read_step(1).unwrap();
    assert_eq!(frame.step(), 1);
    assert_eq!(frame.positions()[0].z, 1.0);

    // After a random access, the sequential cursor resumes at step + 1.
    let frame = trajectory.read().unwrap();
    assert_eq!(frame.step(), 2);
    assert_eq!(frame.positions()[0].z, 2.0);

    assert!(matches!(trajectory.read_step(12), Err(Error::File(_))));
}

#[test]
fn write_then_read_back() {
    let path = temp("mol_files_engine_write.xyz");

    {
        let mut trajectory = Trajectory::create(&path).unwrap();
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("C"), Vec3::new(1.0, 2.0, 3.0), None);
        trajectory.write(&frame).unwrap();
        frame.add_atom(Atom::new("O"), Vec3::new(4.0, 5.0, 6.0), None);
        trajectory.write(&frame).unwrap();
        trajectory.close().unwrap();
    }

    let mut trajectory = Trajectory::open(&path).unwrap();
    assert_eq!(trajectory.nsteps(), 2);
    let frame = trajectory.read_step(1).unwrap();
    assert_eq!(frame.len(), 2);
    assert_eq!(frame.positions()[1].y, 5.0);

    std::fs::remove_file(path).unwrap();
}

#[test]
fn append_mode() {
    let path = temp("mol_files_engine_append.xyz");

    let mut frame = Frame::new();
    frame.add_atom(Atom::new("C"), Vec3::new_zero(), None);

    {
        let mut trajectory = Trajectory::create(&path).unwrap();
        trajectory.write(&frame).unwrap();
    }
    {
        let mut trajectory = Trajectory::open_with(&path, Mode::Append, "").unwrap();
        trajectory.write(&frame).unwrap();
    }

    let trajectory = Trajectory::open(&path).unwrap();
    assert_eq!(trajectory.nsteps(), 2);

    std::fs::remove_file(path).unwrap();
}

#[test]
fn closed_trajectories_reject_everything() {
    let mut trajectory =
        Trajectory::memory_reader(three_frames().as_bytes(), "XYZ").unwrap();
    trajectory.close().unwrap();
    // Closing is idempotent.
    trajectory.close().unwrap();

    assert!(matches!(trajectory.read(), Err(Error::File(_))));
    assert!(matches!(trajectory.read_step(0), Err(Error::File(_))));
}

#[test]
fn mode_enforcement() {
    let mut trajectory =
        Trajectory::memory_reader(three_frames().as_bytes(), "XYZ").unwrap();
    let frame = trajectory.read().unwrap();
    assert!(matches!(trajectory.write(&frame), Err(Error::File(_))));

    let path = temp("mol_files_engine_mode.xyz");
    let mut writer = Trajectory::create(&path).unwrap();
    assert!(matches!(writer.read(), Err(Error::File(_))));
    writer.write(&frame).unwrap();
    drop(writer);
    std::fs::remove_file(path).unwrap();
}

#[test]
fn missing_files_and_unknown_formats() {
    assert!(matches!(
        Trajectory::open("/definitely/not/here.xyz"),
        Err(Error::File(_))
    ));
    assert!(matches!(
        Trajectory::open(temp("mol_files_engine.unknown-ext")),
        Err(Error::Format(_))
    ));
    assert!(matches!(
        Trajectory::memory_reader(b"2\nc\nO 0 0 0\nH 1 0 0\n", ""),
        Err(Error::Format(_))
    ));
}

#[test]
fn cell_and_topology_overrides() {
    let mut trajectory =
        Trajectory::memory_reader(three_frames().as_bytes(), "XYZ").unwrap();
    trajectory.set_cell(UnitCell::new([42.0, 42.0, 42.0]).unwrap());

    let mut topology = Topology::new();
    topology.add_atom(Atom::new("Zr"));
    topology.add_atom(Atom::new("Zr"));
    topology.add_bond(0, 1).unwrap();
    trajectory.set_topology(topology);

    let frame = trajectory.read().unwrap();
    assert_eq!(frame.cell().lengths(), [42.0, 42.0, 42.0]);
    assert_eq!(frame.topology()[0].name(), "Zr");
    assert_eq!(frame.topology().bonds().len(), 1);

    // A mismatched override is an error on the next read.
    let mut short = Topology::new();
    short.add_atom(Atom::new("Zr"));
    trajectory.set_topology(short);
    assert!(trajectory.read().is_err());
}

#[test]
fn topology_override_from_file() {
    let topology_path = temp("mol_files_engine_topology.xyz");
    std::fs::write(&topology_path, "2\ncomment\nZr 0.0 0.0 0.0\nZr 1.0 0.0 0.0\n").unwrap();

    let mut trajectory =
        Trajectory::memory_reader(three_frames().as_bytes(), "XYZ").unwrap();
    trajectory.set_topology_file(&topology_path, "").unwrap();

    let frame = trajectory.read().unwrap();
    assert_eq!(frame.topology()[1].name(), "Zr");

    std::fs::remove_file(topology_path).unwrap();
}

#[test]
fn compressed_trajectories() {
    let path = temp("mol_files_engine_compressed.xyz.gz");

    {
        let mut trajectory = Trajectory::create(&path).unwrap();
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("Ne"), Vec3::new(1.0, 2.0, 3.0), None);
        trajectory.write(&frame).unwrap();
        trajectory.close().unwrap();
    }

    // The compression and the format are both inferred from the path.
    let mut trajectory = Trajectory::open(&path).unwrap();
    assert_eq!(trajectory.nsteps(), 1);
    let frame = trajectory.read().unwrap();
    assert_eq!(frame.topology()[0].name(), "Ne");
    assert_eq!(frame.positions()[0].x, 1.0);

    std::fs::remove_file(path).unwrap();
}

#[test]
fn explicit_format_strings() {
    let path = temp("mol_files_engine_explicit.data");
    std::fs::write(&path, three_frames()).unwrap();

    // The extension says nothing, the format string decides.
    let mut trajectory = Trajectory::open_with(&path, Mode::Read, "XYZ").unwrap();
    assert_eq!(trajectory.nsteps(), 3);
    assert_eq!(trajectory.read().unwrap().len(), 2);

    assert!(matches!(
        Trajectory::open_with(&path, Mode::Read, "NOPE"),
        Err(Error::Format(_))
    ));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn memory_writer_restrictions() {
    assert!(Trajectory::memory_writer("XYZ/GZ").is_err());
    assert!(Trajectory::memory_writer("").is_err());
    // DCD is a disk-only format.
    assert!(Trajectory::memory_writer("DCD").is_err());

    let mut writer = Trajectory::memory_writer("XYZ").unwrap();
    assert!(writer.memory_buffer().unwrap().is_empty());

    let mut frame = Frame::new();
    frame.add_atom(Atom::new("He"), Vec3::new_zero(), None);
    writer.write(&frame).unwrap();
    assert!(!writer.memory_buffer().unwrap().is_empty());
}

#[test]
fn formats_list_is_queryable() {
    let formats = mol_files::formats_list();
    assert!(formats.iter().any(|f| f.name == "XYZ"));
    assert!(formats.iter().any(|f| f.name == "PDB"));
    assert!(formats.iter().any(|f| f.name == "DCD" && !f.memory));

    assert_eq!(mol_files::guess_format("thing.mol2").unwrap(), "MOL2");
    assert_eq!(mol_files::guess_format("thing.gro.xz").unwrap(), "GRO");
}
