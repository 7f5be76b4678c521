use std::fs;
use std::path::{Path, PathBuf};

// String #defines read from stepper_config.h, with their fallbacks
const STRING_DEFINES: &[(&str, &str)] = &[
    ("STEPPER_WIFI_SSID", ""),
    ("STEPPER_WIFI_PASSWORD", ""),
    ("STEPPER_FIRMWARE_UPG_URL", "https://10.10.3.1:8070/stepper.bin"),
];

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF
    embuild::espidf::sysenv::output();

    // Add crash log helper for better panic diagnostics
    println!("cargo:rustc-link-arg=-Wl,--undefined=esp_backtrace_print_app_description");

    println!("cargo:rerun-if-changed=stepper_config.h");
    println!("cargo:rerun-if-changed=certs/ca_cert.pem");

    // Read device configuration if it exists
    let config_path = "stepper_config.h";
    let contents = if Path::new(config_path).exists() {
        fs::read_to_string(config_path)?
    } else {
        println!("cargo:warning=stepper_config.h not found! Copy stepper_config.h.example to stepper_config.h and add your settings.");
        String::new()
    };

    for (name, fallback) in STRING_DEFINES {
        let value = find_define(&contents, name)
            .and_then(|line| line.split('"').nth(1).map(str::to_string))
            .unwrap_or_else(|| fallback.to_string());
        println!("cargo:rustc-env={}={}", name, value);
    }

    // Numeric define
    let timeout = find_define(&contents, "STEPPER_OTA_RECV_TIMEOUT_MS")
        .and_then(|line| line.split_whitespace().nth(2))
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(5000);
    println!("cargo:rustc-env=STEPPER_OTA_RECV_TIMEOUT_MS={}", timeout);

    // Flag: present means set
    let skip_cn = find_define(&contents, "STEPPER_SKIP_COMMON_NAME_CHECK").is_some();
    println!("cargo:rustc-env=STEPPER_SKIP_COMMON_NAME_CHECK={}", if skip_cn { "1" } else { "0" });

    // Server CA certificate, NUL-terminated for the C HTTP client. An empty
    // file means "use the IDF certificate bundle".
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let cert_out = out_dir.join("ca_cert.pem");
    let cert_src = Path::new("certs/ca_cert.pem");
    if cert_src.exists() {
        let mut pem = fs::read(cert_src)?;
        pem.push(0);
        fs::write(&cert_out, pem)?;
    } else {
        println!("cargo:warning=certs/ca_cert.pem not found, HTTPS will use the certificate bundle");
        fs::write(&cert_out, b"")?;
    }

    Ok(())
}

fn find_define<'a>(contents: &'a str, name: &str) -> Option<&'a str> {
    contents
        .lines()
        .find(|l| l.split_whitespace().take(2).eq(["#define", name]))
}
