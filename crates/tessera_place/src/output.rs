//! Placement-file serialization and parsing.
//!
//! The text format has a two-line header (column names and a dash rule),
//! then one row per block: `name\t\tx\ty\t\t#id`, sorted by the numeric id
//! suffix. Names default to the id's own textual form when no name table is
//! supplied. Parsing inverts serialization exactly.

use std::collections::BTreeMap;
use std::io::{self, Write};
use tessera_common::BlockId;

use crate::data::Placement;
use crate::error::PlaceError;

/// Optional block-id-to-name table for the output file.
pub type NameTable = BTreeMap<BlockId, String>;

/// Writes the placement in the text format.
pub fn write_placement<W: Write>(
    out: &mut W,
    placement: &Placement,
    names: Option<&NameTable>,
) -> io::Result<()> {
    let header = format!("{}\t\t\t{}\t{}\t\t#{}\n", "Block Name", "X", "Y", "Block ID");
    out.write_all(header.as_bytes())?;
    writeln!(out, "{}", "-".repeat(header.len()))?;

    let mut blocks: Vec<BlockId> = placement
        .keys()
        .copied()
        .filter(|b| !b.is_pseudo())
        .collect();
    blocks.sort_by_key(|b| (b.index, b.kind));

    for block in blocks {
        let pos = placement[&block];
        let id = block.to_string();
        let name = names
            .and_then(|table| table.get(&block))
            .map(String::as_str)
            .unwrap_or(&id);
        writeln!(out, "{}\t\t{}\t{}\t\t#{}", name, pos.x, pos.y, id)?;
    }
    Ok(())
}

/// Serializes the placement to a string.
pub fn placement_to_string(placement: &Placement, names: Option<&NameTable>) -> String {
    let mut buf = Vec::new();
    // writing to a Vec cannot fail
    let _ = write_placement(&mut buf, placement, names);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Parses a placement file, returning the placement and the name table.
pub fn parse_placement(text: &str) -> Result<(Placement, NameTable), PlaceError> {
    let mut placement = Placement::new();
    let mut names = NameTable::new();
    for (lineno, line) in text.lines().enumerate().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(PlaceError::InvalidInput(format!(
                "placement line {} has {} fields, expected 4",
                lineno + 1,
                fields.len()
            )));
        }
        let x: u32 = fields[1].parse().map_err(|_| {
            PlaceError::InvalidInput(format!("bad x coordinate '{}'", fields[1]))
        })?;
        let y: u32 = fields[2].parse().map_err(|_| {
            PlaceError::InvalidInput(format!("bad y coordinate '{}'", fields[2]))
        })?;
        let id_field = fields[3].strip_prefix('#').ok_or_else(|| {
            PlaceError::InvalidInput(format!("bad id field '{}'", fields[3]))
        })?;
        let block: BlockId = id_field.parse().map_err(|_| {
            PlaceError::InvalidInput(format!("bad block id '{id_field}'"))
        })?;
        placement.insert(block, tessera_common::Position::new(x, y));
        names.insert(block, fields[0].to_string());
    }
    Ok((placement, names))
}
