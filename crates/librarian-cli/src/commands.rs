use std::{fs, io::Write};

use chrono::{DateTime, Local};
use color_eyre::{
    eyre::{bail, eyre},
    Result,
};
use librarian_core::{
    documents::{column_index, HEADER_COLUMNS},
    PasswordPrompt, DEFAULT_LIBRARY,
};
use librarian_library::{Library, LibraryManager};
use serde_json::Value;

use crate::prompt;

/// Print the named library, or the last active one. A refused password shows
/// the default library instead, with a warning.
pub fn show<P: PasswordPrompt>(
    manager: &mut LibraryManager<P>,
    name: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    match name {
        Some(name) => manager.get_library(name, None)?,
        None => manager.get_last_library()?,
    };
    warn_on_fallback(manager);

    let library = active(manager)?;
    let flags = library.headers();
    let columns: Vec<&str> = HEADER_COLUMNS
        .iter()
        .zip(&flags)
        .filter_map(|(column, shown)| shown.then_some(*column))
        .collect();

    writeln!(
        out,
        "Library: {}{}",
        library.name(),
        if library.is_encrypted() { " (encrypted)" } else { "" }
    )?;
    writeln!(out, "Path: {}", library.path().display())?;
    writeln!(out, "Columns: {}", columns.join(", "))?;
    writeln!(out, "Config: {}", serde_json::to_string_pretty(library.config())?)?;
    writeln!(out, "Meta: {}", serde_json::to_string_pretty(library.meta())?)?;
    Ok(())
}

/// List every known library with its last modification time; `*` marks the
/// one resumed by default.
pub fn list<P: PasswordPrompt>(manager: &LibraryManager<P>, out: &mut dyn Write) -> Result<()> {
    let registry = manager.registry();
    let last = registry.read_last_active()?;

    for name in registry.names() {
        let marker = if last.as_deref() == Some(name.as_str()) { '*' } else { ' ' };
        let modified = fs::metadata(registry.layout().archive_path(name))
            .and_then(|meta| meta.modified())
            .map(|time| DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| "-".to_string());
        writeln!(out, "{marker} {name:<24} {modified}")?;
    }
    Ok(())
}

/// Create a library, asking for its password through `secret` when `encrypt`
/// is set.
pub fn create<P: PasswordPrompt>(
    manager: &mut LibraryManager<P>,
    name: &str,
    encrypt: bool,
    secret: &mut dyn PasswordPrompt,
    out: &mut dyn Write,
) -> Result<()> {
    let password = if encrypt {
        Some(prompt::new_password(secret, name)?)
    } else {
        None
    };

    let library = manager.new_library(name, password)?;
    writeln!(
        out,
        "Created library \"{}\"{}",
        library.name(),
        if library.is_encrypted() { " (encrypted)" } else { "" }
    )?;
    Ok(())
}

/// Print `key` from the library metadata, or store `value` under it. Values
/// that do not parse as JSON are stored as strings.
pub fn meta<P: PasswordPrompt>(
    manager: &mut LibraryManager<P>,
    name: &str,
    key: &str,
    value: Option<String>,
    out: &mut dyn Write,
) -> Result<()> {
    let library = open_exact(manager, name)?;

    let Some(raw) = value else {
        match library.meta().get(key) {
            Some(current) => writeln!(out, "{key} = {current}")?,
            None => writeln!(out, "{key} is not set")?,
        }
        return Ok(());
    };

    let value = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
    writeln!(out, "{key} = {value}")?;
    library.meta_mut().insert(key.to_string(), value);
    library.save()?;
    Ok(())
}

/// Flip the named columns, then print every column with its state.
pub fn headers<P: PasswordPrompt>(
    manager: &mut LibraryManager<P>,
    name: &str,
    toggle: &[String],
    out: &mut dyn Write,
) -> Result<()> {
    let indexes = toggle
        .iter()
        .map(|column| {
            column_index(column).ok_or_else(|| {
                eyre!(
                    "unknown column \"{column}\", expected one of: {}",
                    HEADER_COLUMNS.join(", ")
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let library = open_exact(manager, name)?;
    let mut flags = library.headers();
    if !indexes.is_empty() {
        flags.resize(flags.len().max(HEADER_COLUMNS.len()), false);
        for index in indexes {
            flags[index] = !flags[index];
        }
        library.set_headers(&flags);
        library.save()?;
    }

    for (column, shown) in HEADER_COLUMNS.iter().zip(&flags) {
        writeln!(out, "[{}] {column}", if *shown { 'x' } else { ' ' })?;
    }
    Ok(())
}

/// Set or change the password of a library, or drop it with `remove`. The
/// archive is rewritten right away.
pub fn passwd<P: PasswordPrompt>(
    manager: &mut LibraryManager<P>,
    name: &str,
    remove: bool,
    secret: &mut dyn PasswordPrompt,
    out: &mut dyn Write,
) -> Result<()> {
    let library = open_exact(manager, name)?;
    if remove {
        library.set_password(None);
        library.save()?;
        writeln!(out, "Password removed from library \"{name}\"")?;
    } else {
        let password = prompt::new_password(secret, name)?;
        library.set_password(Some(password));
        library.save()?;
        writeln!(out, "Password updated for library \"{name}\"")?;
    }
    Ok(())
}

/// Opens `name` for a change. Unlike [`show`], landing on the default library
/// after a refused password is an error, so nothing is written to the wrong
/// library.
fn open_exact<'a, P: PasswordPrompt>(
    manager: &'a mut LibraryManager<P>,
    name: &str,
) -> Result<&'a mut Library> {
    manager.get_library(name, None)?;
    if let Some(fallback) = manager.take_fallback() {
        bail!(
            "password refused for library \"{}\", nothing was changed",
            fallback.requested
        );
    }
    manager
        .current_mut()
        .ok_or_else(|| eyre!("library \"{name}\" is not open"))
}

fn active<P: PasswordPrompt>(manager: &LibraryManager<P>) -> Result<&Library> {
    manager
        .current()
        .ok_or_else(|| eyre!("no library is open"))
}

fn warn_on_fallback<P: PasswordPrompt>(manager: &mut LibraryManager<P>) {
    if let Some(fallback) = manager.take_fallback() {
        eprintln!(
            "warning: password refused for library \"{}\", showing \"{}\" instead",
            fallback.requested, DEFAULT_LIBRARY
        );
    }
}
