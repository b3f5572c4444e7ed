//! Commands that only handle key material and templates

use std::error::Error;

use boltcard_ntag424::{KeySet, NdefTemplate};

use crate::utils::display;

/// `[[cards]]` entry for the config file
pub fn card_entry_toml(keys: &KeySet) -> String {
    format!(
        "[[cards]]\nkey0 = \"{}\"\npicc_data_key = \"{}\"\ncmac_key = \"{}\"",
        keys.key0.to_hex(),
        keys.picc_data_key.to_hex(),
        keys.cmac_key.to_hex()
    )
}

/// Build a template from a base URL or text
pub fn build_template(base: &str, text: bool) -> Result<NdefTemplate, Box<dyn Error>> {
    let template = if text {
        NdefTemplate::from_text(base)?
    } else {
        NdefTemplate::from_url(base)?
    };
    Ok(template)
}

/// Generate and print a random key set
pub fn keygen_command() -> Result<(), Box<dyn Error>> {
    let keys = KeySet::random();

    println!("{}", display::sensitive_data_warning());
    println!("{}", card_entry_toml(&keys));

    Ok(())
}

/// Print the template and the offsets the card will mirror into
pub fn template_command(base: &str, text: bool) -> Result<(), Box<dyn Error>> {
    let template = build_template(base, text)?;

    println!(
        "{}",
        display::key_value_box(
            "NDEF template",
            vec![
                ("Content", template.value().to_string()),
                ("PICC data offset", template.picc_data_offset().to_string()),
                ("CMAC offset", template.cmac_offset().to_string()),
                ("File", hex::encode_upper(template.file_data())),
            ],
        )
    );

    Ok(())
}
