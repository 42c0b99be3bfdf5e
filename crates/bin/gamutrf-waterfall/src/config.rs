use clap::{Parser, builder::BoolishValueParser};
use gamutrf_core::peaks::{PeakFinder, PeakFinderError};
use gamutrf_core::scan::{ScanParseError, ScannerEndpoint, parse_scanners};
use gamutrf_core::{MAX_FREQ, MIN_FREQ, SAMP_RATE};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

const DEFAULT_NFFT: usize = 256;
const DEFAULT_SAVE_TIME_MINUTES: u64 = 1;
const DEFAULT_SCANNERS: &str = "127.0.0.1:8001";
const DEFAULT_ROTATE_SECS: u64 = 900;
const DEFAULT_REFRESH_SECS: u64 = 5;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug)]
#[command(name = "gamutrf-waterfall", version, about = "Waterfall plotter from scan data.")]
struct CliArgs {
    /// Minimum frequency for plot, Hz.
    #[arg(long, alias = "min_freq", env = "GAMUTRF_MIN_FREQ", default_value_t = MIN_FREQ)]
    min_freq: f64,

    /// Maximum frequency for plot, Hz.
    #[arg(long, alias = "max_freq", env = "GAMUTRF_MAX_FREQ", default_value_t = MAX_FREQ)]
    max_freq: f64,

    #[arg(
        long,
        alias = "sampling_rate",
        env = "GAMUTRF_SAMPLING_RATE",
        default_value_t = SAMP_RATE
    )]
    sampling_rate: f64,

    /// FFT length.
    #[arg(long, env = "GAMUTRF_NFFT", default_value_t = DEFAULT_NFFT)]
    nfft: usize,

    /// Number of high variance frequencies to mark.
    #[arg(long, alias = "n_detect", env = "GAMUTRF_N_DETECT", default_value_t = 0)]
    n_detect: usize,

    /// Plot SNR rather than power.
    #[arg(
        long,
        alias = "plot_snr",
        env = "GAMUTRF_PLOT_SNR",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    plot_snr: bool,

    /// Detection type to plot (wideband, narrowband).
    #[arg(long, alias = "detection_type", env = "GAMUTRF_DETECTION_TYPE", default_value = "")]
    detection_type: String,

    /// Directory for snapshots and detections.
    #[arg(long, alias = "save_path", env = "GAMUTRF_SAVE_PATH", default_value = "")]
    save_path: String,

    /// Save a snapshot every N minutes.
    #[arg(
        long,
        alias = "save_time",
        env = "GAMUTRF_SAVE_TIME",
        default_value_t = DEFAULT_SAVE_TIME_MINUTES
    )]
    save_time: u64,

    /// Comma separated scanner endpoints.
    #[arg(long, env = "GAMUTRF_SCANNERS", default_value = DEFAULT_SCANNERS)]
    scanners: String,

    /// If set, serve the waterfall on this port.
    #[arg(long, env = "GAMUTRF_PORT", default_value_t = 0)]
    port: u16,

    /// Rotate save directories every N seconds; 0 disables.
    #[arg(
        long,
        alias = "rotate_secs",
        env = "GAMUTRF_ROTATE_SECS",
        default_value_t = DEFAULT_ROTATE_SECS
    )]
    rotate_secs: u64,

    /// Replay scans from a JSON lines file instead of scanners.
    #[arg(long, env = "GAMUTRF_REPLAY")]
    replay: Option<PathBuf>,

    #[arg(
        long,
        alias = "refresh_secs",
        env = "GAMUTRF_REFRESH_SECS",
        default_value_t = DEFAULT_REFRESH_SECS
    )]
    refresh_secs: u64,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, alias = "log_level", env = "GAMUTRF_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct WaterfallSettings {
    pub min_freq: f64,
    pub max_freq: f64,
    pub sampling_rate: f64,
    pub nfft: usize,
    pub n_detect: usize,
    pub plot_snr: bool,
    pub peak_finder: Option<PeakFinder>,
    pub save_path: Option<PathBuf>,
    pub save_time_minutes: u64,
    pub scanners: Vec<ScannerEndpoint>,
    pub port: Option<u16>,
    pub rotate_secs: u64,
    pub replay: Option<PathBuf>,
    pub refresh_secs: u64,
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidSetting { name: &'static str, value: String },
    Scanners(ScanParseError),
    DetectionType(PeakFinderError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSetting { name, value } => write!(f, "invalid {name} value: {value}"),
            Self::Scanners(err) => write!(f, "invalid scanners: {err}"),
            Self::DetectionType(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {}

impl WaterfallSettings {
    /// Parses the command line and `GAMUTRF_*` environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError` when a setting is invalid.
    pub fn from_args() -> Result<Self, ConfigError> {
        Self::try_from(CliArgs::parse())
    }
}

impl TryFrom<CliArgs> for WaterfallSettings {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.min_freq.partial_cmp(&args.max_freq) != Some(Ordering::Less) {
            return Err(ConfigError::InvalidSetting {
                name: "min_freq",
                value: format!("{} (must be below max_freq {})", args.min_freq, args.max_freq),
            });
        }
        if args.nfft == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "nfft",
                value: args.nfft.to_string(),
            });
        }
        if args.sampling_rate.is_nan() || args.sampling_rate <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                name: "sampling_rate",
                value: args.sampling_rate.to_string(),
            });
        }

        let detection_type = args.detection_type.trim();
        let peak_finder = if detection_type.is_empty() {
            None
        } else {
            Some(detection_type.parse().map_err(ConfigError::DetectionType)?)
        };

        let scanners = parse_scanners(&args.scanners).map_err(ConfigError::Scanners)?;
        let save_path = Some(args.save_path.trim())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        let replay = args.replay.filter(|path| !path.as_os_str().is_empty());

        Ok(Self {
            min_freq: args.min_freq,
            max_freq: args.max_freq,
            sampling_rate: args.sampling_rate,
            nfft: args.nfft,
            n_detect: args.n_detect,
            plot_snr: args.plot_snr,
            peak_finder,
            save_path,
            save_time_minutes: args.save_time,
            scanners,
            port: (args.port != 0).then_some(args.port),
            rotate_secs: args.rotate_secs,
            replay,
            refresh_secs: args.refresh_secs,
            log_level: args.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            min_freq: MIN_FREQ,
            max_freq: MAX_FREQ,
            sampling_rate: SAMP_RATE,
            nfft: DEFAULT_NFFT,
            n_detect: 0,
            plot_snr: false,
            detection_type: String::new(),
            save_path: String::new(),
            save_time: DEFAULT_SAVE_TIME_MINUTES,
            scanners: DEFAULT_SCANNERS.to_string(),
            port: 0,
            rotate_secs: DEFAULT_ROTATE_SECS,
            replay: None,
            refresh_secs: DEFAULT_REFRESH_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    #[test]
    fn defaults_disable_optional_outputs() {
        let settings = WaterfallSettings::try_from(base_args()).expect("settings should parse");

        assert!(settings.peak_finder.is_none());
        assert!(settings.save_path.is_none());
        assert!(settings.port.is_none());
        assert_eq!(settings.scanners.len(), 1);
        assert_eq!(settings.scanners[0].port, 8001);
    }

    #[test]
    fn parses_detection_type_case_insensitively() {
        let mut args = base_args();
        args.detection_type = "NarrowBand".to_string();
        args.save_path = " /tmp/gamutrf ".to_string();
        args.port = 9002;

        let settings = WaterfallSettings::try_from(args).expect("settings should parse");

        assert_eq!(settings.peak_finder, Some(PeakFinder::Narrowband));
        assert_eq!(settings.save_path, Some(PathBuf::from("/tmp/gamutrf")));
        assert_eq!(settings.port, Some(9002));
    }

    #[test]
    fn rejects_unknown_detection_type() {
        let mut args = base_args();
        args.detection_type = "broadband".to_string();
        assert!(matches!(
            WaterfallSettings::try_from(args),
            Err(ConfigError::DetectionType(_))
        ));
    }

    #[test]
    fn rejects_inverted_band() {
        let mut args = base_args();
        args.min_freq = MAX_FREQ;
        assert!(matches!(
            WaterfallSettings::try_from(args),
            Err(ConfigError::InvalidSetting { name: "min_freq", .. })
        ));
    }

    #[test]
    fn rejects_zero_fft_length() {
        let mut args = base_args();
        args.nfft = 0;
        assert!(WaterfallSettings::try_from(args).is_err());
    }

    #[test]
    fn accepts_underscore_flag_spelling() {
        let args = CliArgs::try_parse_from([
            "gamutrf-waterfall",
            "--min_freq",
            "1e8",
            "--max-freq",
            "2e8",
            "--plot_snr",
        ])
        .expect("args should parse");
        assert!((args.min_freq - 1e8).abs() < f64::EPSILON);
        assert!(args.plot_snr);
    }
}
