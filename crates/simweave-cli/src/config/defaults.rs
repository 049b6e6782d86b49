/// A per-code plugin variant: how its executable is found and called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    /// `None` means the executable must be configured explicitly.
    pub executable: Option<&'static str>,
    pub dir_var: Option<&'static str>,
    pub args: &'static [&'static str],
    /// Register the `expand_element` filter when nuclide data is available.
    pub expand_elements: bool,
}

pub const PRESETS: [Preset; 3] = [
    Preset {
        name: "generic",
        executable: None,
        dir_var: None,
        args: &["{input}"],
        expand_elements: false,
    },
    Preset {
        name: "cyclus",
        executable: Some("cyclus"),
        dir_var: Some("CYCLUS_DIR"),
        args: &["{input}", "-o", "{stem}.sqlite"],
        expand_elements: false,
    },
    Preset {
        name: "mcnp",
        executable: Some("mcnp6"),
        dir_var: Some("MCNP_DIR"),
        args: &["i={input}"],
        expand_elements: true,
    },
];

pub fn preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

pub struct DefaultsConfig {
    pub preset: String,
    pub workspace_prefix: String,
    pub archive: bool,
    pub csv: bool,
    pub show_stderr: bool,
    pub params_file: String,
    pub results_file: String,
    pub poll_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            preset: "generic".to_string(),
            workspace_prefix: "simweave".to_string(),
            archive: true,
            csv: true,
            show_stderr: false,
            params_file: "params.in".to_string(),
            results_file: "results.out".to_string(),
            poll_ms: 25,
        }
    }
}
