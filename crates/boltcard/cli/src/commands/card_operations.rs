//! Commands that talk to a card on the reader

use std::error::Error;

use boltcard_ntag424::file::FileSettings;
use boltcard_ntag424::{CardProvisioner, KeySet};
use tracing::debug;

use super::keys::{build_template, card_entry_toml};
use super::unless_cancelled;
use crate::config::Config;
use crate::transport::PcscTransport;
use crate::utils::{KeyArgs, display};

fn describe_settings(settings: &FileSettings) -> String {
    let mut description = format!(
        "{} bytes, {} mode, read {:?} / write {:?} / change {:?}",
        settings.file_size,
        settings.communication_mode,
        settings.read_permission,
        settings.write_permission,
        settings.change_permission
    );
    if let Some(sdm) = &settings.sdm {
        description.push_str(&format!(
            ", SDM (meta read {:?}, file read {:?}, picc data @ {:?}, mac @ {:?})",
            sdm.meta_read, sdm.file_read, sdm.picc_data_offset, sdm.mac_offset
        ));
    }
    description
}

/// Provision a blank card
pub fn write_command(
    transport: PcscTransport,
    config: &Config,
    base: &str,
    text: bool,
    keys: &KeyArgs,
) -> Result<(), Box<dyn Error>> {
    let template = build_template(base, text)?;
    let (keys, generated) = match keys.key_set(config)? {
        Some(keys) => (keys, false),
        None => {
            debug!("Generating random keys");
            (KeySet::random(), true)
        }
    };

    let mut provisioner = CardProvisioner::over_transport(transport, config.provisioner.clone());
    let Some(outcome) = unless_cancelled(provisioner.write(&keys, &template))? else {
        return Ok(());
    };

    println!("{}", display::success("Card written"));
    println!(
        "{}",
        display::key_value_box(
            "Card",
            vec![
                ("UID", outcome.chip_uid.to_string()),
                ("PICC data key slot", outcome.picc_data_slot.to_string()),
                ("CMAC key slot", outcome.cmac_slot.to_string()),
                ("NDEF", template.value().to_string()),
            ],
        )
    );

    if generated {
        println!("{}", display::sensitive_data_warning());
        println!("{}", card_entry_toml(&keys));
    }

    Ok(())
}

/// Return a card to factory state
pub fn reset_command(
    transport: PcscTransport,
    config: &Config,
    keys: &KeyArgs,
) -> Result<(), Box<dyn Error>> {
    let keys = keys
        .key_set(config)?
        .ok_or("reset needs the card's keys (--card, or --key0 with --picc-data-key and --cmac-key)")?;

    let mut provisioner = CardProvisioner::over_transport(transport, config.provisioner.clone());
    let Some(outcome) = unless_cancelled(provisioner.reset(&keys))? else {
        return Ok(());
    };

    if outcome.already_reset {
        println!(
            "{}",
            display::info(&format!("Card {} was already reset", outcome.chip_uid))
        );
    } else {
        println!(
            "{}",
            display::success(&format!("Card {} reset", outcome.chip_uid))
        );
    }

    Ok(())
}

/// Show what is on a card
pub fn inspect_command(
    transport: PcscTransport,
    config: &Config,
    keys: &KeyArgs,
) -> Result<(), Box<dyn Error>> {
    let key0 = keys
        .key0(config)?
        .unwrap_or_else(|| config.provisioner.default_key.clone());

    let mut provisioner = CardProvisioner::over_transport(transport, config.provisioner.clone());
    let Some(report) = unless_cancelled(provisioner.inspect(&key0))? else {
        return Ok(());
    };

    let mut items = vec![
        ("UID", report.chip_uid.to_string()),
        ("CC file", describe_settings(&report.cc_settings)),
        ("CC data", hex::encode_upper(&report.cc_data)),
        ("NDEF file", describe_settings(&report.ndef_settings)),
        ("NDEF data", hex::encode_upper(&report.ndef_data)),
        (
            "Proprietary file",
            describe_settings(&report.proprietary_settings),
        ),
    ];
    if let Some(url) = &report.ndef_url {
        items.push(("NDEF URL", url.clone()));
    }
    if let Some(capabilities) = &report.capabilities {
        items.push((
            "CC",
            format!(
                "version {:#04x}, MLe {}, MLc {}, {} file(s)",
                capabilities.version,
                capabilities.max_le,
                capabilities.max_lc,
                capabilities.files.len()
            ),
        ));
    }

    println!("{}", display::key_value_box("Card", items));
    Ok(())
}
