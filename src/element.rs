//! Static periodic-table data, consulted by [`Atom`](crate::Atom) when an
//! atomic type matches an element symbol. Masses are in atomic mass units,
//! radii in Angstroms.

/// Data about one chemical element.
#[derive(Clone, Copy, Debug)]
pub struct ElementData {
    pub symbol: &'static str,
    pub name: &'static str,
    pub number: u64,
    pub mass: f64,
    pub covalent_radius: Option<f64>,
    pub vdw_radius: Option<f64>,
}

const fn element(
    symbol: &'static str,
    name: &'static str,
    number: u64,
    mass: f64,
    covalent_radius: Option<f64>,
    vdw_radius: Option<f64>,
) -> ElementData {
    ElementData {
        symbol,
        name,
        number,
        mass,
        covalent_radius,
        vdw_radius,
    }
}

#[rustfmt::skip]
pub static PERIODIC_TABLE: &[ElementData] = &[
    element("H",  "Hydrogen",      1,   1.008,     Some(0.31), Some(1.20)),
    element("He", "Helium",        2,   4.002602,  Some(0.28), Some(1.40)),
    element("Li", "Lithium",       3,   6.94,      Some(1.28), Some(1.82)),
    element("Be", "Beryllium",     4,   9.0121831, Some(0.96), Some(1.53)),
    element("B",  "Boron",         5,   10.81,     Some(0.84), Some(1.92)),
    element("C",  "Carbon",        6,   12.011,    Some(0.76), Some(1.70)),
    element("N",  "Nitrogen",      7,   14.007,    Some(0.71), Some(1.55)),
    element("O",  "Oxygen",        8,   15.999,    Some(0.66), Some(1.52)),
    element("F",  "Fluorine",      9,   18.998403, Some(0.57), Some(1.47)),
    element("Ne", "Neon",          10,  20.1797,   Some(0.58), Some(1.54)),
    element("Na", "Sodium",        11,  22.989769, Some(1.66), Some(2.27)),
    element("Mg", "Magnesium",     12,  24.305,    Some(1.41), Some(1.73)),
    element("Al", "Aluminum",      13,  26.981538, Some(1.21), Some(1.84)),
    element("Si", "Silicon",       14,  28.085,    Some(1.11), Some(2.10)),
    element("P",  "Phosphorus",    15,  30.973762, Some(1.07), Some(1.80)),
    element("S",  "Sulfur",        16,  32.06,     Some(1.05), Some(1.80)),
    element("Cl", "Chlorine",      17,  35.45,     Some(1.02), Some(1.75)),
    element("Ar", "Argon",         18,  39.948,    Some(1.06), Some(1.88)),
    element("K",  "Potassium",     19,  39.0983,   Some(2.03), Some(2.75)),
    element("Ca", "Calcium",       20,  40.078,    Some(1.76), Some(2.31)),
    element("Sc", "Scandium",      21,  44.955908, Some(1.70), Some(2.11)),
    element("Ti", "Titanium",      22,  47.867,    Some(1.60), None),
    element("V",  "Vanadium",      23,  50.9415,   Some(1.53), None),
    element("Cr", "Chromium",      24,  51.9961,   Some(1.39), None),
    element("Mn", "Manganese",     25,  54.938044, Some(1.39), None),
    element("Fe", "Iron",          26,  55.845,    Some(1.32), None),
    element("Co", "Cobalt",        27,  58.933194, Some(1.26), None),
    element("Ni", "Nickel",        28,  58.6934,   Some(1.24), Some(1.63)),
    element("Cu", "Copper",        29,  63.546,    Some(1.32), Some(1.40)),
    element("Zn", "Zinc",          30,  65.38,     Some(1.22), Some(1.39)),
    element("Ga", "Gallium",       31,  69.723,    Some(1.22), Some(1.87)),
    element("Ge", "Germanium",     32,  72.63,     Some(1.20), Some(2.11)),
    element("As", "Arsenic",       33,  74.921595, Some(1.19), Some(1.85)),
    element("Se", "Selenium",      34,  78.971,    Some(1.20), Some(1.90)),
    element("Br", "Bromine",       35,  79.904,    Some(1.20), Some(1.85)),
    element("Kr", "Krypton",       36,  83.798,    Some(1.16), Some(2.02)),
    element("Rb", "Rubidium",      37,  85.4678,   Some(2.20), Some(3.03)),
    element("Sr", "Strontium",     38,  87.62,     Some(1.95), Some(2.49)),
    element("Y",  "Yttrium",       39,  88.90584,  Some(1.90), None),
    element("Zr", "Zirconium",     40,  91.224,    Some(1.75), None),
    element("Nb", "Niobium",       41,  92.90637,  Some(1.64), None),
    element("Mo", "Molybdenum",    42,  95.95,     Some(1.54), None),
    element("Tc", "Technetium",    43,  97.0,      Some(1.47), None),
    element("Ru", "Ruthenium",     44,  101.07,    Some(1.46), None),
    element("Rh", "Rhodium",       45,  102.9055,  Some(1.42), None),
    element("Pd", "Palladium",     46,  106.42,    Some(1.39), Some(1.63)),
    element("Ag", "Silver",        47,  107.8682,  Some(1.45), Some(1.72)),
    element("Cd", "Cadmium",       48,  112.414,   Some(1.44), Some(1.58)),
    element("In", "Indium",        49,  114.818,   Some(1.42), Some(1.93)),
    element("Sn", "Tin",           50,  118.71,    Some(1.39), Some(2.17)),
    element("Sb", "Antimony",      51,  121.76,    Some(1.39), Some(2.06)),
    element("Te", "Tellurium",     52,  127.6,     Some(1.38), Some(2.06)),
    element("I",  "Iodine",        53,  126.90447, Some(1.39), Some(1.98)),
    element("Xe", "Xenon",         54,  131.293,   Some(1.40), Some(2.16)),
    element("Cs", "Cesium",        55,  132.90545, Some(2.44), Some(3.43)),
    element("Ba", "Barium",        56,  137.327,   Some(2.15), Some(2.68)),
    element("La", "Lanthanum",     57,  138.90547, Some(2.07), None),
    element("Ce", "Cerium",        58,  140.116,   Some(2.04), None),
    element("Pr", "Praseodymium",  59,  140.90766, Some(2.03), None),
    element("Nd", "Neodymium",     60,  144.242,   Some(2.01), None),
    element("Pm", "Promethium",    61,  145.0,     Some(1.99), None),
    element("Sm", "Samarium",      62,  150.36,    Some(1.98), None),
    element("Eu", "Europium",      63,  151.964,   Some(1.98), None),
    element("Gd", "Gadolinium",    64,  157.25,    Some(1.96), None),
    element("Tb", "Terbium",       65,  158.92535, Some(1.94), None),
    element("Dy", "Dysprosium",    66,  162.5,     Some(1.92), None),
    element("Ho", "Holmium",       67,  164.93033, Some(1.92), None),
    element("Er", "Erbium",        68,  167.259,   Some(1.89), None),
    element("Tm", "Thulium",       69,  168.93422, Some(1.90), None),
    element("Yb", "Ytterbium",     70,  173.045,   Some(1.87), None),
    element("Lu", "Lutetium",      71,  174.9668,  Some(1.87), None),
    element("Hf", "Hafnium",       72,  178.49,    Some(1.75), None),
    element("Ta", "Tantalum",      73,  180.94788, Some(1.70), None),
    element("W",  "Tungsten",      74,  183.84,    Some(1.62), None),
    element("Re", "Rhenium",       75,  186.207,   Some(1.51), None),
    element("Os", "Osmium",        76,  190.23,    Some(1.44), None),
    element("Ir", "Iridium",       77,  192.217,   Some(1.41), None),
    element("Pt", "Platinum",      78,  195.084,   Some(1.36), Some(1.75)),
    element("Au", "Gold",          79,  196.96657, Some(1.36), Some(1.66)),
    element("Hg", "Mercury",       80,  200.592,   Some(1.32), Some(1.55)),
    element("Tl", "Thallium",      81,  204.38,    Some(1.45), Some(1.96)),
    element("Pb", "Lead",          82,  207.2,     Some(1.46), Some(2.02)),
    element("Bi", "Bismuth",       83,  208.9804,  Some(1.48), Some(2.07)),
    element("Po", "Polonium",      84,  209.0,     Some(1.40), Some(1.97)),
    element("At", "Astatine",      85,  210.0,     Some(1.50), Some(2.02)),
    element("Rn", "Radon",         86,  222.0,     Some(1.50), Some(2.20)),
    element("Fr", "Francium",      87,  223.0,     Some(2.60), Some(3.48)),
    element("Ra", "Radium",        88,  226.0,     Some(2.21), Some(2.83)),
    element("Ac", "Actinium",      89,  227.0,     Some(2.15), None),
    element("Th", "Thorium",       90,  232.0377,  Some(2.06), None),
    element("Pa", "Protactinium",  91,  231.03588, Some(2.00), None),
    element("U",  "Uranium",       92,  238.02891, Some(1.96), Some(1.86)),
    element("Np", "Neptunium",     93,  237.0,     Some(1.90), None),
    element("Pu", "Plutonium",     94,  244.0,     Some(1.87), None),
    element("Am", "Americium",     95,  243.0,     Some(1.80), None),
    element("Cm", "Curium",        96,  247.0,     Some(1.69), None),
    element("Bk", "Berkelium",     97,  247.0,     None,       None),
    element("Cf", "Californium",   98,  251.0,     None,       None),
    element("Es", "Einsteinium",   99,  252.0,     None,       None),
    element("Fm", "Fermium",       100, 257.0,     None,       None),
    element("Md", "Mendelevium",   101, 258.0,     None,       None),
    element("No", "Nobelium",      102, 259.0,     None,       None),
    element("Lr", "Lawrencium",    103, 266.0,     None,       None),
    element("Rf", "Rutherfordium", 104, 267.0,     None,       None),
    element("Db", "Dubnium",       105, 268.0,     None,       None),
    element("Sg", "Seaborgium",    106, 269.0,     None,       None),
    element("Bh", "Bohrium",       107, 270.0,     None,       None),
    element("Hs", "Hassium",       108, 277.0,     None,       None),
    element("Mt", "Meitnerium",    109, 278.0,     None,       None),
    element("Ds", "Darmstadtium",  110, 281.0,     None,       None),
    element("Rg", "Roentgenium",   111, 282.0,     None,       None),
    element("Cn", "Copernicium",   112, 285.0,     None,       None),
    element("Nh", "Nihonium",      113, 286.0,     None,       None),
    element("Fl", "Flerovium",     114, 289.0,     None,       None),
    element("Mc", "Moscovium",     115, 290.0,     None,       None),
    element("Lv", "Livermorium",   116, 293.0,     None,       None),
    element("Ts", "Tennessine",    117, 294.0,     None,       None),
    element("Og", "Oganesson",     118, 294.0,     None,       None),
];

/// Look up an element by symbol, canonicalizing case first ("FE" and "fe"
/// both find iron). Returns `None` for anything that is not an element
/// symbol, including force-field style types like "OW" or "c3".
pub fn lookup(symbol: &str) -> Option<&'static ElementData> {
    if symbol.is_empty() || symbol.len() > 3 {
        return None;
    }

    let mut canonical = String::with_capacity(symbol.len());
    let mut chars = symbol.chars();
    canonical.extend(chars.next().map(|c| c.to_ascii_uppercase()));
    canonical.extend(chars.map(|c| c.to_ascii_lowercase()));

    PERIODIC_TABLE.iter().find(|e| e.symbol == canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(lookup("O").unwrap().number, 8);
        assert_eq!(lookup("o").unwrap().name, "Oxygen");
        assert_eq!(lookup("FE").unwrap().symbol, "Fe");
        assert_eq!(lookup("Zn").unwrap().mass, 65.38);

        assert!(lookup("").is_none());
        assert!(lookup("OW").is_none());
        assert!(lookup("Xx").is_none());
    }

    #[test]
    fn table_is_ordered() {
        for (i, element) in PERIODIC_TABLE.iter().enumerate() {
            assert_eq!(element.number, i as u64 + 1);
        }
    }
}
