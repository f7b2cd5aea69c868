// src/core/handlers/hex.rs

use crate::{
    constants::NULL_STR,
    core::{dispatcher::Operation, paths::remove_quotes, task_executor::ExecutionContext},
    system::hex_edit::{self, HexError},
};

/// Both operands as equally long hex strings, the shorter padded with zero bytes.
fn padded_ascii_pair(find: &str, replace: &str) -> (String, String) {
    let mut find = hex_edit::ascii_to_hex(find);
    let mut replace = hex_edit::ascii_to_hex(replace);
    let width = find.len().max(replace.len());
    for hex in [&mut find, &mut replace] {
        while hex.len() < width {
            hex.push_str("00");
        }
    }
    (find, replace)
}

/// The optional 1-based occurrence in the 5th token; `0` means all.
fn occurrence(command: &[String]) -> Result<usize, HexError> {
    match command.get(4) {
        Some(token) => {
            let token = remove_quotes(token);
            token.trim().parse().map_err(|_| HexError::InvalidNumber(token))
        }
        None => Ok(0),
    }
}

/// `hex-by-* <file> <a> <b> [occurrence|value]`
pub fn handle(context: &mut ExecutionContext<'_>, operation: Operation, command: &[String]) {
    let [_, file, second, third, rest @ ..] = command else {
        return;
    };
    let path = context.services.fs.resolve(&context.path(file));
    let (second, third) = (remove_quotes(second), remove_quotes(third));
    let hex = &context.services.hex;

    let result = match operation {
        Operation::HexByCustomOffset
        | Operation::HexByCustomDecimalOffset
        | Operation::HexByCustomReversedDecimalOffset => {
            let Some(value) = rest.first().map(|token| remove_quotes(token)) else {
                return;
            };
            if value == NULL_STR {
                log::debug!("Skipping custom-offset edit of '{}' with a null value", path.display());
                return;
            }
            let value = match operation {
                Operation::HexByCustomDecimalOffset => hex_edit::decimal_to_hex(&value),
                Operation::HexByCustomReversedDecimalOffset => hex_edit::decimal_to_reversed_hex(&value),
                _ => Ok(value),
            };
            value.and_then(|value| hex.by_custom_offset(&path, &second, &third, &value))
        }
        Operation::HexByOffset => hex.by_offset(&path, &second, &third),
        Operation::HexBySwap => {
            occurrence(command).and_then(|nth| hex.find_replace(&path, &second, &third, nth))
        }
        Operation::HexByString => {
            let (find, replace) = padded_ascii_pair(&second, &third);
            occurrence(command).and_then(|nth| hex.find_replace(&path, &find, &replace, nth))
        }
        Operation::HexByDecimal | Operation::HexByReversedDecimal => {
            let convert = if operation == Operation::HexByDecimal {
                hex_edit::decimal_to_hex
            } else {
                hex_edit::decimal_to_reversed_hex
            };
            convert(&second).and_then(|find| {
                let replace = convert(&third)?;
                let nth = occurrence(command)?;
                hex.find_replace(&path, &find, &replace, nth)
            })
        }
        _ => return,
    };
    context.record(result);
}
