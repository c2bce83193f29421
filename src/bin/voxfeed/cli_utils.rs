use anyhow::Result;

fn detect_devices() -> Result<Vec<String>> {
    #[cfg(feature = "native-mic")]
    {
        voxfeed::host::native::list_input_devices()
    }
    #[cfg(not(feature = "native-mic"))]
    {
        anyhow::bail!("built without the native-mic feature")
    }
}

pub(crate) fn list_input_devices() -> Result<()> {
    // Support VOXFEED_TEST_DEVICES for testing
    let devices = if let Ok(raw) = std::env::var("VOXFEED_TEST_DEVICES") {
        raw.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    } else {
        detect_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}
