//! Bakes the station WiFi credentials into the image.
//!
//! `WIFI_SSID` and `WIFI_PASSWORD` are read from the environment or from a
//! `.env` file next to the crate. Without them the firmware comes up as a
//! provisioning access point.

fn main() {
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed=WIFI_SSID");
    println!("cargo:rerun-if-env-changed=WIFI_PASSWORD");

    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=no .env loaded ({e}); using the build environment only");
    }

    for key in ["WIFI_SSID", "WIFI_PASSWORD"] {
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) => println!("cargo:warning={key} not set; station mode disabled"),
        }
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
