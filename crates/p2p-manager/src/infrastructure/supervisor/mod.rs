//! Supervised supplicant process: generated config and argument vector.
//!
//! The supplicant is started as
//!
//! ```text
//! <binary> -D<driver> -i<iface> -C<control_dir> -ddd -t -K -c<config> -W
//! ```
//!
//! after writing a small generated config file.  The process side itself
//! lives in [`process`]; [`mock`] provides a recording double.

pub mod mock;
pub mod process;

use std::path::PathBuf;

pub use process::SupplicantProcess;

/// Everything needed to launch one supplicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplicantLaunch {
    pub binary_path: PathBuf,
    pub driver: String,
    pub interface: String,
    /// Directory in which the supplicant creates its control socket.
    pub control_dir: PathBuf,
    /// Where the generated config file is written.
    pub config_path: PathBuf,
    pub device_name: String,
    /// Keep the child's stdout/stderr attached.
    pub debug: bool,
}

/// Contents of the generated supplicant config.
pub fn render_supplicant_config(device_name: &str) -> String {
    format!(
        "# GENERATED - DO NOT EDIT!\n\
         config_methods=pbc\n\
         ap_scan=1\n\
         device_name={device_name}"
    )
}

/// Command-line arguments, binary excluded.
pub fn build_args(launch: &SupplicantLaunch) -> Vec<String> {
    vec![
        format!("-D{}", launch.driver),
        format!("-i{}", launch.interface),
        format!("-C{}", launch.control_dir.display()),
        "-ddd".to_string(),
        "-t".to_string(),
        "-K".to_string(),
        format!("-c{}", launch.config_path.display()),
        "-W".to_string(),
    ]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn launch() -> SupplicantLaunch {
        SupplicantLaunch {
            binary_path: PathBuf::from("/sbin/wpa_supplicant"),
            driver: "nl80211".to_string(),
            interface: "p2p0".to_string(),
            control_dir: PathBuf::from("/var/run/p2p0_supplicant"),
            config_path: PathBuf::from("/tmp/supplicant-p2p0.conf"),
            device_name: "unknown".to_string(),
            debug: false,
        }
    }

    #[test]
    fn test_render_config_has_static_lines_and_device_name() {
        let config = render_supplicant_config("unknown");
        assert_eq!(
            config,
            "# GENERATED - DO NOT EDIT!\nconfig_methods=pbc\nap_scan=1\ndevice_name=unknown"
        );
    }

    #[test]
    fn test_build_args_matches_expected_vector() {
        assert_eq!(
            build_args(&launch()),
            vec![
                "-Dnl80211",
                "-ip2p0",
                "-C/var/run/p2p0_supplicant",
                "-ddd",
                "-t",
                "-K",
                "-c/tmp/supplicant-p2p0.conf",
                "-W",
            ]
        );
    }
}
