//! Reader discovery

use std::error::Error;

use pcsc::{Context, ReaderState, Scope, State};

/// A reader and whether a card sits on it
#[derive(Debug, Clone)]
pub struct Reader {
    name: String,
    has_card: bool,
}

impl Reader {
    /// Reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a card is present
    pub const fn has_card(&self) -> bool {
        self.has_card
    }
}

/// Establish a user-scoped PC/SC context
pub fn establish_context() -> Result<Context, Box<dyn Error>> {
    Ok(Context::establish(Scope::User)?)
}

/// List all readers with their card presence
pub fn list_readers(context: &Context) -> Result<Vec<Reader>, Box<dyn Error>> {
    let names = context.list_readers_owned()?;

    let mut states: Vec<ReaderState> = names
        .iter()
        .map(|name| ReaderState::new(name.as_c_str(), State::UNAWARE))
        .collect();
    if states.is_empty() {
        return Ok(Vec::new());
    }
    context.get_status_change(None, &mut states)?;

    Ok(states
        .iter()
        .map(|state| Reader {
            name: state.name().to_string_lossy().into_owned(),
            has_card: state.event_state().contains(State::PRESENT)
                && !state.event_state().contains(State::EMPTY),
        })
        .collect())
}

/// Print all readers
pub fn print_readers(context: &Context) -> Result<(), Box<dyn Error>> {
    let readers = list_readers(context)?;

    if readers.is_empty() {
        println!("No readers found!");
        return Ok(());
    }

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = if reader.has_card() {
            "card present"
        } else {
            "no card"
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }

    Ok(())
}

/// Find a reader with a specific name
pub fn find_reader_by_name(context: &Context, reader_name: &str) -> Result<Reader, Box<dyn Error>> {
    list_readers(context)?
        .into_iter()
        .find(|r| r.name() == reader_name)
        .ok_or_else(|| format!("Reader '{}' not found", reader_name).into())
}

/// Find a reader with a card on it
pub fn find_reader_with_card(context: &Context) -> Result<Reader, Box<dyn Error>> {
    let readers = list_readers(context)?;

    if readers.is_empty() {
        return Err("No readers found!".into());
    }

    readers
        .into_iter()
        .find(Reader::has_card)
        .ok_or_else(|| "No card found in any reader!".into())
}
