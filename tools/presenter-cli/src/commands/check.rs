//! Check displays, capture devices and permissions.

use presenter_capture_engine::list_capture_devices;

pub fn run() -> anyhow::Result<()> {
    println!("Presenter System Check");
    println!("{}", "=".repeat(50));

    #[cfg(target_os = "linux")]
    let ready = linux_report();
    #[cfg(not(target_os = "linux"))]
    let ready = {
        println!("[INFO] Permissions are requested by the OS when a device is first opened.");
        true
    };

    println!();
    match list_capture_devices() {
        Ok(devices) if devices.is_empty() => println!("[WARN] No webcams or microphones found"),
        Ok(devices) => {
            println!("[OK] Capture devices: {}", devices.len());
            for device in &devices {
                println!(
                    "     {:<13} {} {}",
                    device.class,
                    device.name,
                    if device.is_default { "(default)" } else { "" }
                );
            }
        }
        Err(e) => println!("[WARN] Could not enumerate capture devices: {e}"),
    }

    println!();
    if ready {
        println!("All required capabilities are available. Presenter is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn linux_report() -> bool {
    use presenter_platform_linux::permissions::{check_capabilities, print_capability_report};
    use presenter_platform_linux::{detect_display_server, detect_monitors, DisplayServer};

    match detect_display_server() {
        DisplayServer::X11 => println!("[OK] Display server: X11"),
        DisplayServer::Wayland => {
            println!("[WARN] Display server: Wayland (screen track needs an X11 session)")
        }
        DisplayServer::Unknown => println!("[WARN] Display server: Unknown"),
    }

    match detect_monitors() {
        Ok(monitors) => {
            println!("[OK] Monitors detected: {}", monitors.len());
            for m in &monitors {
                let (w, h) = m.encoder_dimensions();
                println!(
                    "     {} {}x{} @ {}Hz (encoded {}x{}) {}",
                    m.name,
                    m.width,
                    m.height,
                    m.refresh_rate_hz,
                    w,
                    h,
                    if m.primary { "(primary)" } else { "" }
                );
            }
        }
        Err(e) => println!("[WARN] Monitor detection failed: {e}"),
    }

    let capabilities = check_capabilities();
    println!();
    print_capability_report(&capabilities);

    capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available)
}
