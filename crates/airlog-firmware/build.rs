//! Bakes Wi-Fi credentials and endpoints from `.env` into the binary.
//!
//! Variables already set in the build environment win over the file.

const BAKED: [&str; 8] = [
    "WIFI_SSID",
    "WIFI_PASSWORD",
    "AIRLOG_DEVICE_ID",
    "AIRLOG_POST_URL",
    "AIRLOG_S3_BUCKET",
    "AIRLOG_S3_REGION",
    "AIRLOG_MANIFEST_URL",
    "AIRLOG_TZ_OFFSET_HOURS",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for name in BAKED {
        println!("cargo:rerun-if-env-changed={}", name);
        let value = std::env::var(name).unwrap_or_default();
        println!("cargo:rustc-env={}={}", name, value);
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
