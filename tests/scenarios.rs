//! End-to-end behavior checks, exercising a reader, the data model, and a
//! writer together.

use std::sync::{Arc, Mutex};

use assert_approx_eq::assert_approx_eq;
use lin_alg::f64::Vec3;

use mol_files::{
    Atom, CellShape, Error, Frame, Match, Selection, Trajectory, UnitCell,
};

const EXTENDED_XYZ: &str = "\
3
Properties=species:S:1:pos:R:3 Lattice=\"10 0 0 0 10 0 0 0 10\"
O 0.0 0.0 1.0
H 1.0 0.0 0.0
H -1.0 0.0 0.0
";

#[test]
fn xyz_roundtrip_is_byte_identical() {
    let mut reader = Trajectory::memory_reader(EXTENDED_XYZ.as_bytes(), "XYZ").unwrap();
    assert_eq!(reader.nsteps(), 1);

    let frame = reader.read().unwrap();
    assert_eq!(frame.len(), 3);
    assert_eq!(frame.cell().shape(), CellShape::Orthorhombic);
    assert_eq!(frame.cell().lengths(), [10.0, 10.0, 10.0]);
    assert_eq!(frame.topology()[0].name(), "O");
    assert_eq!(frame.positions()[0].z, 1.0);
    assert_eq!(frame.positions()[2].x, -1.0);

    let mut writer = Trajectory::memory_writer("XYZ").unwrap();
    writer.write(&frame).unwrap();
    let written = writer.memory_buffer().unwrap();
    assert_eq!(
        String::from_utf8(written).unwrap(),
        EXTENDED_XYZ,
        "the reserialised XYZ file must be byte-identical to its input"
    );
}

const PDB_CONECT: &str = "\
ATOM      1  O   HOH A   1       0.000   0.000   0.000  1.00  0.00           O
ATOM      2  H   HOH A   1       0.957   0.000   0.000  1.00  0.00           H
CONECT    1    2
END
";

#[test]
fn pdb_conect_makes_one_bond() {
    let mut trajectory = Trajectory::memory_reader(PDB_CONECT.as_bytes(), "PDB").unwrap();
    let frame = trajectory.read_step(0).unwrap();

    assert_eq!(frame.len(), 2);
    let bonds = frame.topology().bonds();
    assert_eq!(bonds.len(), 1);
    assert_eq!((bonds[0][0], bonds[0][1]), (0, 1));

    // Reading the same file twice yields equal frames.
    let again = trajectory.read_step(0).unwrap();
    assert_eq!(frame.len(), again.len());
    for i in 0..frame.len() {
        let (a, b) = (frame.positions()[i], again.positions()[i]);
        assert_eq!((a.x, a.y, a.z), (b.x, b.y, b.z));
        assert_eq!(frame.topology()[i], again.topology()[i]);
    }
    assert_eq!(frame.topology().bonds(), again.topology().bonds());
}

#[test]
fn bonds_selection_with_two_variables() {
    // H at 0, O at 1, O at 2, H at 3; bonds 0-1, 1-2, 2-3.
    let mut frame = Frame::new();
    for (name, x) in [("H", 0.0), ("O", 1.0), ("O", 2.0), ("H", 3.0)] {
        frame.add_atom(Atom::new(name), Vec3::new(x, 0.0, 0.0), None);
    }
    frame.add_bond(0, 1).unwrap();
    frame.add_bond(1, 2).unwrap();
    frame.add_bond(2, 3).unwrap();

    let mut selection = Selection::new("bonds: name(#1) O and type(#2) H").unwrap();
    let matches = selection.evaluate(&frame).unwrap();

    assert_eq!(matches.len(), 2);
    assert!(matches.contains(&Match::new(&[1, 0])));
    assert!(matches.contains(&Match::new(&[2, 3])));
}

#[test]
fn bad_extended_xyz_properties_fall_back() {
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = warnings.clone();
    mol_files::set_warning_callback(move |message: &str| {
        sink.lock().unwrap().push(message.to_owned());
    });

    let content = "\
2
Properties=species:S:1:pos:R:3:bad:R:
O 0.0 0.0 1.0
H 1.0 0.0 0.0
";
    let mut trajectory = Trajectory::memory_reader(content.as_bytes(), "XYZ").unwrap();
    let frame = trajectory.read().unwrap();
    mol_files::reset_warning_callback();

    assert!(!warnings.lock().unwrap().is_empty(), "a warning must be emitted");
    assert_eq!(frame.len(), 2);
    assert_eq!(frame.positions()[0].z, 1.0);
    assert_eq!(frame.positions()[1].x, 1.0);
    assert!(frame.topology()[0].get("bad").is_none());
}

/// A minimal single-frame DCD file with the given CHARMM version and cell
/// record.
fn dcd_bytes(version: i32, cell: [f64; 6]) -> Vec<u8> {
    let mut out = Vec::new();
    let marker = |out: &mut Vec<u8>, value: u32| out.extend(value.to_le_bytes());

    marker(&mut out, 84);
    out.extend(b"CORD");
    let mut icntrl = [0i32; 20];
    icntrl[0] = 1; // one frame
    icntrl[2] = 1;
    icntrl[10] = 1; // unit cell present
    icntrl[19] = version;
    for value in icntrl {
        out.extend(value.to_le_bytes());
    }
    marker(&mut out, 84);

    // Title block
    marker(&mut out, 4);
    out.extend(0i32.to_le_bytes());
    marker(&mut out, 4);

    // Atom count
    marker(&mut out, 4);
    out.extend(1i32.to_le_bytes());
    marker(&mut out, 4);

    // Cell record
    marker(&mut out, 48);
    for value in cell {
        out.extend(value.to_le_bytes());
    }
    marker(&mut out, 48);

    // One atom: x, y, z records
    for _ in 0..3 {
        marker(&mut out, 4);
        out.extend(0.0f32.to_le_bytes());
        marker(&mut out, 4);
    }
    out
}

#[test]
fn dcd_cell_encodings_agree() {
    let reference = UnitCell::triclinic([12.0, 13.0, 14.0], [80.0, 90.0, 120.0]).unwrap();

    // CHARMM < 25: cosines of the angles between the lengths.
    let cos_encoded = dcd_bytes(24, [
        12.0,
        (120.0f64).to_radians().cos(),
        13.0,
        (90.0f64).to_radians().cos(),
        (80.0f64).to_radians().cos(),
        14.0,
    ]);

    // CHARMM >= 25: upper-triangular cell vectors.
    let b = reference.b_vector();
    let c = reference.c_vector();
    let vector_encoded = dcd_bytes(26, [12.0, b.x, b.y, c.x, c.y, c.z]);

    let path_a = std::env::temp_dir().join("mol_files_scenario_dcd_a.dcd");
    let path_b = std::env::temp_dir().join("mol_files_scenario_dcd_b.dcd");
    std::fs::write(&path_a, cos_encoded).unwrap();
    std::fs::write(&path_b, vector_encoded).unwrap();

    let cell_a = Trajectory::open(&path_a).unwrap().read().unwrap().cell().clone();
    let cell_b = Trajectory::open(&path_b).unwrap().read().unwrap().cell().clone();

    for i in 0..3 {
        assert_approx_eq!(cell_a.lengths()[i], cell_b.lengths()[i], 1e-6);
        assert_approx_eq!(cell_a.angles()[i], cell_b.angles()[i], 1e-6);
        assert_approx_eq!(cell_a.lengths()[i], reference.lengths()[i], 1e-6);
        assert_approx_eq!(cell_a.angles()[i], reference.angles()[i], 1e-6);
    }

    std::fs::remove_file(path_a).unwrap();
    std::fs::remove_file(path_b).unwrap();
}

#[test]
fn constant_folding_in_selections() {
    let selection = Selection::new("3 + 4 < 5").unwrap();
    assert_eq!(selection.print(), "7 < 5");

    let mut frame = Frame::new();
    frame.add_atom(Atom::new("H"), Vec3::new_zero(), None);
    let mut selection = Selection::new("3 + 4 < 5").unwrap();
    assert!(selection.evaluate(&frame).unwrap().is_empty());
}

#[test]
fn selection_matches_have_context_arity() {
    let mut frame = Frame::new();
    for i in 0..4 {
        frame.add_atom(Atom::new("C"), Vec3::new(i as f64, 0.0, 0.0), None);
    }
    frame.add_bond(0, 1).unwrap();
    frame.add_bond(1, 2).unwrap();
    frame.add_bond(2, 3).unwrap();

    for (context, arity) in [
        ("atoms", 1),
        ("pairs", 2),
        ("three", 3),
        ("four", 4),
        ("bonds", 2),
        ("angles", 3),
        ("dihedrals", 4),
    ] {
        let mut selection = Selection::new(&format!("{context}: all")).unwrap();
        assert_eq!(selection.size(), arity);
        for match_ in selection.evaluate(&frame).unwrap() {
            assert_eq!(match_.len(), arity);
            let indices: Vec<usize> = match_.iter().collect();
            for (n, a) in indices.iter().enumerate() {
                for b in &indices[n + 1..] {
                    assert_ne!(a, b, "indices in a match must be distinct");
                }
            }
        }
    }
}

#[test]
fn lazy_property_type_check() {
    let mut frame = Frame::new();
    let mut atom = Atom::new("H");
    atom.set("label", "first");
    frame.add_atom(atom, Vec3::new_zero(), None);

    // Parsing is fine, evaluation raises the property error.
    let mut selection = Selection::new("[label] < 4").unwrap();
    assert!(matches!(
        selection.evaluate(&frame),
        Err(Error::Property(_))
    ));
}
