use std::fmt;

// ProgramVariant — the shape-specialization axis
//
// The same logical computation is compiled three ways and must agree:
//
//   Static           — every input dimension is known at compile time
//   PartiallyDynamic — a configured subset of dims is erased to dynamic
//   FullyDynamic     — every input dimension is erased to dynamic
//
// Program files encode their variant as a single-letter segment in the
// name, e.g. `dequantize_s_int8_channel_scaled` / `dequantize_p_...` /
// `dequantize_d_...`.

/// Which dimensions of the input descriptors are erased before compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramVariant {
    Static,
    PartiallyDynamic,
    FullyDynamic,
}

impl ProgramVariant {
    /// All three variants, in increasing order of erasure.
    pub const ALL: [ProgramVariant; 3] = [
        ProgramVariant::Static,
        ProgramVariant::PartiallyDynamic,
        ProgramVariant::FullyDynamic,
    ];

    /// The single-letter marker embedded in program names.
    pub fn marker(&self) -> char {
        match self {
            ProgramVariant::Static => 's',
            ProgramVariant::PartiallyDynamic => 'p',
            ProgramVariant::FullyDynamic => 'd',
        }
    }

    /// Variant for a marker letter, if it is one.
    pub fn from_marker(c: char) -> Option<Self> {
        match c {
            's' => Some(ProgramVariant::Static),
            'p' => Some(ProgramVariant::PartiallyDynamic),
            'd' => Some(ProgramVariant::FullyDynamic),
            _ => None,
        }
    }

    /// Scan a program name for a variant marker: the first underscore-
    /// delimited segment that is exactly one marker letter.
    pub fn detect_in_name(name: &str) -> Option<Self> {
        name.split('_').find_map(|seg| {
            let mut chars = seg.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Self::from_marker(c),
                _ => None,
            }
        })
    }

    /// Rewrite the variant marker segment of a program name, if present.
    pub fn rename(&self, name: &str) -> String {
        name.split('_')
            .map(|seg| {
                let mut chars = seg.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if Self::from_marker(c).is_some() => {
                        self.marker().to_string()
                    }
                    _ => seg.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for ProgramVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgramVariant::Static => "static",
            ProgramVariant::PartiallyDynamic => "partially-dynamic",
            ProgramVariant::FullyDynamic => "fully-dynamic",
        };
        write!(f, "{}", s)
    }
}
