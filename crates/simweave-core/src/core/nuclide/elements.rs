use phf::{Map, phf_map};

/// A naturally occurring isotope with its terrestrial atom-fraction abundance
/// and atomic mass in unified atomic mass units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NaturalIsotope {
    pub z: u32,
    pub a: u32,
    pub abundance: f64,
    pub mass: f64,
}

impl NaturalIsotope {
    /// The `ZZZAAA` identifier used by nuclear data libraries.
    pub fn za(&self) -> u32 {
        self.z * 1000 + self.a
    }
}

static ELEMENT_SYMBOLS: Map<&'static str, u32> = phf_map! {
    "H" => 1, "He" => 2, "Li" => 3, "Be" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8,
    "F" => 9, "Ne" => 10, "Na" => 11, "Mg" => 12, "Al" => 13, "Si" => 14, "P" => 15,
    "S" => 16, "Cl" => 17, "Ar" => 18, "K" => 19, "Ca" => 20, "Sc" => 21, "Ti" => 22,
    "V" => 23, "Cr" => 24, "Mn" => 25, "Fe" => 26, "Co" => 27, "Ni" => 28, "Cu" => 29,
    "Zn" => 30, "Ga" => 31, "Ge" => 32, "As" => 33, "Se" => 34, "Br" => 35, "Kr" => 36,
    "Rb" => 37, "Sr" => 38, "Y" => 39, "Zr" => 40, "Nb" => 41, "Mo" => 42, "Tc" => 43,
    "Ru" => 44, "Rh" => 45, "Pd" => 46, "Ag" => 47, "Cd" => 48, "In" => 49, "Sn" => 50,
    "Sb" => 51, "Te" => 52, "I" => 53, "Xe" => 54, "Cs" => 55, "Ba" => 56, "La" => 57,
    "Ce" => 58, "Pr" => 59, "Nd" => 60, "Pm" => 61, "Sm" => 62, "Eu" => 63, "Gd" => 64,
    "Tb" => 65, "Dy" => 66, "Ho" => 67, "Er" => 68, "Tm" => 69, "Yb" => 70, "Lu" => 71,
    "Hf" => 72, "Ta" => 73, "W" => 74, "Re" => 75, "Os" => 76, "Ir" => 77, "Pt" => 78,
    "Au" => 79, "Hg" => 80, "Tl" => 81, "Pb" => 82, "Bi" => 83, "Po" => 84, "At" => 85,
    "Rn" => 86, "Fr" => 87, "Ra" => 88, "Ac" => 89, "Th" => 90, "Pa" => 91, "U" => 92,
    "Np" => 93, "Pu" => 94, "Am" => 95, "Cm" => 96, "Bk" => 97, "Cf" => 98, "Es" => 99,
    "Fm" => 100, "Md" => 101, "No" => 102, "Lr" => 103, "Rf" => 104, "Db" => 105,
    "Sg" => 106, "Bh" => 107, "Hs" => 108, "Mt" => 109, "Ds" => 110, "Rg" => 111,
    "Cn" => 112, "Nh" => 113, "Fl" => 114, "Mc" => 115, "Lv" => 116, "Ts" => 117,
    "Og" => 118,
};

macro_rules! iso {
    ($z:expr, $a:expr, $abundance:expr, $mass:expr) => {
        NaturalIsotope {
            z: $z,
            a: $a,
            abundance: $abundance,
            mass: $mass,
        }
    };
}

// IUPAC representative isotopic compositions; sorted by (Z, A).
static NATURAL_ISOTOPES: &[NaturalIsotope] = &[
    iso!(1, 1, 0.999885, 1.00782503223),
    iso!(1, 2, 0.000115, 2.01410177812),
    iso!(2, 3, 0.00000134, 3.0160293201),
    iso!(2, 4, 0.99999866, 4.00260325413),
    iso!(3, 6, 0.0759, 6.0151228874),
    iso!(3, 7, 0.9241, 7.0160034366),
    iso!(4, 9, 1.0, 9.012183065),
    iso!(5, 10, 0.199, 10.01293695),
    iso!(5, 11, 0.801, 11.00930536),
    iso!(6, 12, 0.9893, 12.0),
    iso!(6, 13, 0.0107, 13.00335483507),
    iso!(7, 14, 0.99636, 14.00307400443),
    iso!(7, 15, 0.00364, 15.00010889888),
    iso!(8, 16, 0.99757, 15.99491461957),
    iso!(8, 17, 0.00038, 16.99913175650),
    iso!(8, 18, 0.00205, 17.99915961286),
    iso!(9, 19, 1.0, 18.99840316273),
    iso!(10, 20, 0.9048, 19.9924401762),
    iso!(10, 21, 0.0027, 20.993846685),
    iso!(10, 22, 0.0925, 21.991385114),
    iso!(11, 23, 1.0, 22.9897692820),
    iso!(12, 24, 0.7899, 23.985041697),
    iso!(12, 25, 0.1000, 24.985836976),
    iso!(12, 26, 0.1101, 25.982592968),
    iso!(13, 27, 1.0, 26.98153853),
    iso!(14, 28, 0.92223, 27.97692653465),
    iso!(14, 29, 0.04685, 28.97649466490),
    iso!(14, 30, 0.03092, 29.973770136),
    iso!(15, 31, 1.0, 30.97376199842),
    iso!(16, 32, 0.9499, 31.9720711744),
    iso!(16, 33, 0.0075, 32.9714589098),
    iso!(16, 34, 0.0425, 33.967867004),
    iso!(16, 36, 0.0001, 35.96708071),
    iso!(17, 35, 0.7576, 34.968852682),
    iso!(17, 37, 0.2424, 36.965902602),
    iso!(18, 36, 0.003336, 35.967545105),
    iso!(18, 38, 0.000629, 37.96273211),
    iso!(18, 40, 0.996035, 39.9623831237),
    iso!(19, 39, 0.932581, 38.9637064864),
    iso!(19, 40, 0.000117, 39.963998166),
    iso!(19, 41, 0.067302, 40.9618252579),
    iso!(20, 40, 0.96941, 39.962590863),
    iso!(20, 42, 0.00647, 41.95861783),
    iso!(20, 43, 0.00135, 42.95876644),
    iso!(20, 44, 0.02086, 43.95548156),
    iso!(20, 46, 0.00004, 45.9536890),
    iso!(20, 48, 0.00187, 47.95252276),
    iso!(21, 45, 1.0, 44.95590828),
    iso!(22, 46, 0.0825, 45.95262772),
    iso!(22, 47, 0.0744, 46.95175879),
    iso!(22, 48, 0.7372, 47.94794198),
    iso!(22, 49, 0.0541, 48.94786568),
    iso!(22, 50, 0.0518, 49.94478689),
    iso!(23, 50, 0.00250, 49.94715601),
    iso!(23, 51, 0.99750, 50.94395704),
    iso!(24, 50, 0.04345, 49.94604183),
    iso!(24, 52, 0.83789, 51.94050623),
    iso!(24, 53, 0.09501, 52.94064815),
    iso!(24, 54, 0.02365, 53.93887916),
    iso!(25, 55, 1.0, 54.93804391),
    iso!(26, 54, 0.05845, 53.93960899),
    iso!(26, 56, 0.91754, 55.93493633),
    iso!(26, 57, 0.02119, 56.93539284),
    iso!(26, 58, 0.00282, 57.93327443),
    iso!(27, 59, 1.0, 58.93319429),
    iso!(28, 58, 0.68077, 57.93534241),
    iso!(28, 60, 0.26223, 59.93078588),
    iso!(28, 61, 0.011399, 60.93105557),
    iso!(28, 62, 0.036346, 61.92834537),
    iso!(28, 64, 0.009255, 63.92796682),
    iso!(29, 63, 0.6915, 62.92959772),
    iso!(29, 65, 0.3085, 64.92778970),
    iso!(30, 64, 0.4917, 63.92914201),
    iso!(30, 66, 0.2773, 65.92603381),
    iso!(30, 67, 0.0404, 66.92712775),
    iso!(30, 68, 0.1845, 67.92484455),
    iso!(30, 70, 0.0061, 69.9253192),
    iso!(31, 69, 0.60108, 68.9255735),
    iso!(31, 71, 0.39892, 70.92470258),
    iso!(32, 70, 0.2057, 69.92424875),
    iso!(32, 72, 0.2745, 71.922075826),
    iso!(32, 73, 0.0775, 72.923458956),
    iso!(32, 74, 0.3650, 73.921177761),
    iso!(32, 76, 0.0773, 75.921402726),
    iso!(33, 75, 1.0, 74.92159457),
    iso!(34, 74, 0.0089, 73.922475934),
    iso!(34, 76, 0.0937, 75.919213704),
    iso!(34, 77, 0.0763, 76.919914154),
    iso!(34, 78, 0.2377, 77.91730928),
    iso!(34, 80, 0.4961, 79.9165218),
    iso!(34, 82, 0.0873, 81.9166995),
    iso!(35, 79, 0.5069, 78.9183376),
    iso!(35, 81, 0.4931, 80.9162897),
    iso!(36, 78, 0.00355, 77.92036494),
    iso!(36, 80, 0.02286, 79.91637808),
    iso!(36, 82, 0.11593, 81.91348273),
    iso!(36, 83, 0.11500, 82.91412716),
    iso!(36, 84, 0.56987, 83.9114977282),
    iso!(36, 86, 0.17279, 85.9106106269),
    iso!(37, 85, 0.7217, 84.9117897379),
    iso!(37, 87, 0.2783, 86.9091805310),
    iso!(38, 84, 0.0056, 83.9134191),
    iso!(38, 86, 0.0986, 85.9092606),
    iso!(38, 87, 0.0700, 86.9088775),
    iso!(38, 88, 0.8258, 87.9056125),
    iso!(39, 89, 1.0, 88.9058403),
    iso!(40, 90, 0.5145, 89.9046977),
    iso!(40, 91, 0.1122, 90.9056396),
    iso!(40, 92, 0.1715, 91.9050347),
    iso!(40, 94, 0.1738, 93.9063108),
    iso!(40, 96, 0.0280, 95.9082714),
    iso!(41, 93, 1.0, 92.9063730),
    iso!(42, 92, 0.1453, 91.90680796),
    iso!(42, 94, 0.0915, 93.9050849),
    iso!(42, 95, 0.1584, 94.90583877),
    iso!(42, 96, 0.1667, 95.90467612),
    iso!(42, 97, 0.0960, 96.90601812),
    iso!(42, 98, 0.2439, 97.90540482),
    iso!(42, 100, 0.0982, 99.9074718),
    iso!(44, 96, 0.0554, 95.90759025),
    iso!(44, 98, 0.0187, 97.9052868),
    iso!(44, 99, 0.1276, 98.9059341),
    iso!(44, 100, 0.1260, 99.9042143),
    iso!(44, 101, 0.1706, 100.9055769),
    iso!(44, 102, 0.3155, 101.9043441),
    iso!(44, 104, 0.1862, 103.9054275),
    iso!(45, 103, 1.0, 102.9054980),
    iso!(46, 102, 0.0102, 101.9056022),
    iso!(46, 104, 0.1114, 103.9040305),
    iso!(46, 105, 0.2233, 104.9050796),
    iso!(46, 106, 0.2733, 105.9034804),
    iso!(46, 108, 0.2646, 107.9038916),
    iso!(46, 110, 0.1172, 109.9051722),
    iso!(47, 107, 0.51839, 106.9050916),
    iso!(47, 109, 0.48161, 108.9047553),
    iso!(48, 106, 0.0125, 105.9064599),
    iso!(48, 108, 0.0089, 107.9041834),
    iso!(48, 110, 0.1249, 109.90300661),
    iso!(48, 111, 0.1280, 110.90418287),
    iso!(48, 112, 0.2413, 111.90276287),
    iso!(48, 113, 0.1222, 112.90440813),
    iso!(48, 114, 0.2873, 113.90336509),
    iso!(48, 116, 0.0749, 115.90476315),
    iso!(49, 113, 0.0429, 112.90406184),
    iso!(49, 115, 0.9571, 114.903878776),
    iso!(50, 112, 0.0097, 111.90482387),
    iso!(50, 114, 0.0066, 113.9027827),
    iso!(50, 115, 0.0034, 114.903344699),
    iso!(50, 116, 0.1454, 115.90174280),
    iso!(50, 117, 0.0768, 116.90295398),
    iso!(50, 118, 0.2422, 117.90160657),
    iso!(50, 119, 0.0859, 118.90331117),
    iso!(50, 120, 0.3258, 119.90220163),
    iso!(50, 122, 0.0463, 121.9034438),
    iso!(50, 124, 0.0579, 123.9052766),
    iso!(51, 121, 0.5721, 120.903812),
    iso!(51, 123, 0.4279, 122.9042132),
    iso!(52, 120, 0.0009, 119.9040593),
    iso!(52, 122, 0.0255, 121.9030435),
    iso!(52, 123, 0.0089, 122.9042698),
    iso!(52, 124, 0.0474, 123.9028171),
    iso!(52, 125, 0.0707, 124.9044299),
    iso!(52, 126, 0.1884, 125.9033109),
    iso!(52, 128, 0.3174, 127.90446128),
    iso!(52, 130, 0.3408, 129.906222748),
    iso!(53, 127, 1.0, 126.9044719),
    iso!(54, 124, 0.000952, 123.905892),
    iso!(54, 126, 0.000890, 125.9042983),
    iso!(54, 128, 0.019102, 127.903531),
    iso!(54, 129, 0.264006, 128.9047808611),
    iso!(54, 130, 0.040710, 129.903509349),
    iso!(54, 131, 0.212324, 130.90508406),
    iso!(54, 132, 0.269086, 131.9041550856),
    iso!(54, 134, 0.104357, 133.90539466),
    iso!(54, 136, 0.088573, 135.907214484),
    iso!(55, 133, 1.0, 132.905451961),
    iso!(56, 130, 0.00106, 129.9063207),
    iso!(56, 132, 0.00101, 131.9050611),
    iso!(56, 134, 0.02417, 133.90450818),
    iso!(56, 135, 0.06592, 134.90568838),
    iso!(56, 136, 0.07854, 135.90457573),
    iso!(56, 137, 0.11232, 136.90582714),
    iso!(56, 138, 0.71698, 137.905247),
    iso!(57, 138, 0.0008881, 137.9071149),
    iso!(57, 139, 0.9991119, 138.9063563),
    iso!(58, 136, 0.00185, 135.90712921),
    iso!(58, 138, 0.00251, 137.905991),
    iso!(58, 140, 0.88450, 139.9054431),
    iso!(58, 142, 0.11114, 141.9092504),
    iso!(59, 141, 1.0, 140.9076576),
    iso!(60, 142, 0.27152, 141.907729),
    iso!(60, 143, 0.12174, 142.90982),
    iso!(60, 144, 0.23798, 143.910093),
    iso!(60, 145, 0.08293, 144.9125793),
    iso!(60, 146, 0.17189, 145.9131226),
    iso!(60, 148, 0.05756, 147.9168993),
    iso!(60, 150, 0.05638, 149.9209022),
    iso!(62, 144, 0.0307, 143.9120065),
    iso!(62, 147, 0.1499, 146.9149044),
    iso!(62, 148, 0.1124, 147.9148292),
    iso!(62, 149, 0.1382, 148.9171921),
    iso!(62, 150, 0.0738, 149.9172829),
    iso!(62, 152, 0.2675, 151.9197397),
    iso!(62, 154, 0.2275, 153.9222169),
    iso!(63, 151, 0.4781, 150.9198578),
    iso!(63, 153, 0.5219, 152.921238),
    iso!(64, 152, 0.0020, 151.9197995),
    iso!(64, 154, 0.0218, 153.9208741),
    iso!(64, 155, 0.1480, 154.9226305),
    iso!(64, 156, 0.2047, 155.9221312),
    iso!(64, 157, 0.1565, 156.9239686),
    iso!(64, 158, 0.2484, 157.9241123),
    iso!(64, 160, 0.2186, 159.9270624),
    iso!(65, 159, 1.0, 158.9253547),
    iso!(66, 156, 0.00056, 155.9242847),
    iso!(66, 158, 0.00095, 157.9244159),
    iso!(66, 160, 0.02329, 159.9252046),
    iso!(66, 161, 0.18889, 160.9269405),
    iso!(66, 162, 0.25475, 161.9268056),
    iso!(66, 163, 0.24896, 162.9287383),
    iso!(66, 164, 0.28260, 163.9291819),
    iso!(67, 165, 1.0, 164.9303288),
    iso!(68, 162, 0.00139, 161.9287884),
    iso!(68, 164, 0.01601, 163.9292088),
    iso!(68, 166, 0.33503, 165.9302995),
    iso!(68, 167, 0.22869, 166.9320546),
    iso!(68, 168, 0.26978, 167.9323767),
    iso!(68, 170, 0.14910, 169.9354702),
    iso!(69, 169, 1.0, 168.9342179),
    iso!(70, 168, 0.00123, 167.9338896),
    iso!(70, 170, 0.02982, 169.9347664),
    iso!(70, 171, 0.1409, 170.9363302),
    iso!(70, 172, 0.2168, 171.9363859),
    iso!(70, 173, 0.16103, 172.9382151),
    iso!(70, 174, 0.32026, 173.9388664),
    iso!(70, 176, 0.12996, 175.9425764),
    iso!(71, 175, 0.97401, 174.9407752),
    iso!(71, 176, 0.02599, 175.9426897),
    iso!(72, 174, 0.0016, 173.9400461),
    iso!(72, 176, 0.0526, 175.9414076),
    iso!(72, 177, 0.1860, 176.9432277),
    iso!(72, 178, 0.2728, 177.9437058),
    iso!(72, 179, 0.1362, 178.9458232),
    iso!(72, 180, 0.3508, 179.946557),
    iso!(73, 180, 0.0001201, 179.9474648),
    iso!(73, 181, 0.9998799, 180.9479958),
    iso!(74, 180, 0.0012, 179.9467108),
    iso!(74, 182, 0.2650, 181.94820394),
    iso!(74, 183, 0.1431, 182.95022275),
    iso!(74, 184, 0.3064, 183.95093092),
    iso!(74, 186, 0.2843, 185.9543628),
    iso!(75, 185, 0.3740, 184.9529545),
    iso!(75, 187, 0.6260, 186.9557501),
    iso!(76, 184, 0.0002, 183.9524885),
    iso!(76, 186, 0.0159, 185.953835),
    iso!(76, 187, 0.0196, 186.9557474),
    iso!(76, 188, 0.1324, 187.9558352),
    iso!(76, 189, 0.1615, 188.9581442),
    iso!(76, 190, 0.2626, 189.9584437),
    iso!(76, 192, 0.4078, 191.961477),
    iso!(77, 191, 0.373, 190.9605893),
    iso!(77, 193, 0.627, 192.9629216),
    iso!(78, 190, 0.00012, 189.9599297),
    iso!(78, 192, 0.00782, 191.9610387),
    iso!(78, 194, 0.3286, 193.9626809),
    iso!(78, 195, 0.3378, 194.9647917),
    iso!(78, 196, 0.2521, 195.96495209),
    iso!(78, 198, 0.07356, 197.9678949),
    iso!(79, 197, 1.0, 196.96656879),
    iso!(80, 196, 0.0015, 195.9658326),
    iso!(80, 198, 0.0997, 197.9667686),
    iso!(80, 199, 0.1687, 198.96828064),
    iso!(80, 200, 0.2310, 199.96832659),
    iso!(80, 201, 0.1318, 200.97030284),
    iso!(80, 202, 0.2986, 201.9706434),
    iso!(80, 204, 0.0687, 203.97349398),
    iso!(81, 203, 0.2952, 202.9723446),
    iso!(81, 205, 0.7048, 204.9744278),
    iso!(82, 204, 0.014, 203.973044),
    iso!(82, 206, 0.241, 205.9744657),
    iso!(82, 207, 0.221, 206.9758973),
    iso!(82, 208, 0.524, 207.9766525),
    iso!(83, 209, 1.0, 208.9803991),
    iso!(90, 232, 1.0, 232.0380558),
    iso!(91, 231, 1.0, 231.0358842),
    iso!(92, 234, 0.000054, 234.0409523),
    iso!(92, 235, 0.007204, 235.0439301),
    iso!(92, 238, 0.992742, 238.0507884),
];

/// Looks up an atomic number by element symbol, ignoring case (`Fe`, `fe`, `FE`).
pub fn atomic_number(symbol: &str) -> Option<u32> {
    let mut chars = symbol.chars();
    let first = chars.next()?.to_ascii_uppercase();
    let normalized: String = std::iter::once(first)
        .chain(chars.map(|c| c.to_ascii_lowercase()))
        .collect();
    ELEMENT_SYMBOLS.get(normalized.as_str()).copied()
}

/// The canonical symbol of element `z`, e.g. `Fe` for 26.
pub fn symbol(z: u32) -> Option<&'static str> {
    ELEMENT_SYMBOLS
        .entries()
        .find(|(_, number)| **number == z)
        .map(|(symbol, _)| *symbol)
}

/// Returns the naturally occurring isotopes of element `z` in increasing
/// mass-number order. Empty for elements with no stable or primordial isotope.
pub fn natural_isotopes(z: u32) -> &'static [NaturalIsotope] {
    let start = NATURAL_ISOTOPES.partition_point(|iso| iso.z < z);
    let end = NATURAL_ISOTOPES.partition_point(|iso| iso.z <= z);
    &NATURAL_ISOTOPES[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_number_is_case_insensitive() {
        assert_eq!(atomic_number("Fe"), Some(26));
        assert_eq!(atomic_number("fe"), Some(26));
        assert_eq!(atomic_number("FE"), Some(26));
        assert_eq!(atomic_number("U"), Some(92));
        assert_eq!(atomic_number("Xx"), None);
        assert_eq!(atomic_number(""), None);
    }

    #[test]
    fn symbol_inverts_atomic_number() {
        assert_eq!(symbol(26), Some("Fe"));
        assert_eq!(symbol(92), Some("U"));
        assert_eq!(symbol(0), None);
        for z in 1..=92 {
            if let Some(sym) = symbol(z) {
                assert_eq!(atomic_number(sym), Some(z));
            }
        }
    }

    #[test]
    fn natural_isotopes_are_sorted_by_mass_number() {
        let fe = natural_isotopes(26);
        let masses: Vec<u32> = fe.iter().map(|i| i.a).collect();
        assert_eq!(masses, vec![54, 56, 57, 58]);
        assert_eq!(fe[1].za(), 26056);
    }

    #[test]
    fn elements_without_natural_isotopes_yield_empty_slice() {
        assert!(natural_isotopes(43).is_empty());
        assert!(natural_isotopes(94).is_empty());
    }

    #[test]
    fn table_is_sorted_and_abundances_sum_to_one() {
        for pair in NATURAL_ISOTOPES.windows(2) {
            assert!((pair[0].z, pair[0].a) < (pair[1].z, pair[1].a));
        }
        for z in 1..=92 {
            let isotopes = natural_isotopes(z);
            if isotopes.is_empty() {
                continue;
            }
            let total: f64 = isotopes.iter().map(|i| i.abundance).sum();
            assert!((total - 1.0).abs() < 2e-3, "Z={} sums to {}", z, total);
        }
    }
}
