/// Default signature data for skimmer detection.
///
/// Serial-bridge Bluetooth modules (HC-05/HC-06 and their clones) are the
/// usual radio in card skimmers found on fuel pumps and ATMs: cheap, tiny,
/// and shipped with factory names that installers rarely change. These
/// tables are the compiled-in rule set; a rule file can replace any of them
/// at runtime (see `filter::RuleSet`).

/// Known skimmer module name signatures (case-insensitive substring match).
pub static SKIMMER_NAME_SIGNATURES: &[&str] = &[
    "HC-05",
    "HC-06",
    "Linvor",
    "RNBT",
    "BT05",
    "BT06",
    "JDY-31",
    "SPP",
    "SerialPort",
    "BT-SPP",
    "MLT-BT05",
    "DSD-TECH",
    "BT-SERIAL",
];

/// Service UUIDs advertised by serial-bridge modules.
pub static SKIMMER_SERVICE_UUIDS: &[&str] = &[
    "00001101-0000-1000-8000-00805f9b34fb", // Serial Port Profile (SPP)
    "0000ffe0-0000-1000-8000-00805f9b34fb", // HC-05/HM-10 custom UART service
];

/// Generic serial/Bluetooth name fragments. Only suspicious on short names.
pub static GENERIC_NAME_SUBSTRINGS: &[&str] =
    &["SERIAL", "PORT", "COM", "BT_", "BLUETOOTH", "HC-"];

/// Names at or above this length never trigger the generic-substring rule.
pub const GENERIC_NAME_MAX_LEN: usize = 20;

/// The two strongest module names. Matched case-sensitively for scoring.
pub static HIGH_CONFIDENCE_MARKERS: &[&str] = &["HC-05", "HC-06"];

/// Signals stronger than this (dBm) suggest a transmitter hidden very close by.
pub const PROXIMITY_RSSI_DBM: i16 = -40;
