//! Example library served by the `robotremote` binary.

use std::path::Path;

use crate::capture::LogLevel;
use crate::error::KeywordError;
use crate::library::{Keyword, KeywordSet, Signature};
use crate::value::Value;

const LIBRARY_DOC: &str = "Example library for trying out the remote server.";

pub fn example_library() -> KeywordSet {
    KeywordSet::new()
        .with_doc(LIBRARY_DOC)
        .with_keyword(
            Keyword::new(
                "count_items_in_directory",
                Signature::method().required("path"),
                |args, _| {
                    let path = args.text("path")?;
                    let mut count = 0usize;
                    for entry in std::fs::read_dir(Path::new(&path))? {
                        if !entry?.file_name().to_string_lossy().starts_with('.') {
                            count += 1;
                        }
                    }
                    Ok(Value::from(count))
                },
            )
            .with_doc("Returns the number of items in the directory specified by `path`."),
        )
        .with_keyword(Keyword::new(
            "strings_should_be_equal",
            Signature::method().required("str1").required("str2"),
            |args, console| {
                let (first, second) = (args.text("str1")?, args.text("str2")?);
                console.println(&format!("Comparing '{first}' to '{second}'."));
                if first != second {
                    return Err(KeywordError::assertion("Given strings are not equal."));
                }
                Ok(Value::None)
            },
        ))
        .with_keyword(
            Keyword::new(
                "log_message",
                Signature::method()
                    .required("message")
                    .optional("level", "INFO"),
                |args, console| {
                    let level = args.text("level")?;
                    let level = LogLevel::parse(&level).ok_or_else(|| {
                        KeywordError::named("ValueError", format!("Invalid log level '{level}'."))
                    })?;
                    console.log(level, &args.text("message")?);
                    Ok(Value::None)
                },
            )
            .with_doc("Logs `message` with the given `level` marker."),
        )
        .with_keyword(
            Keyword::new(
                "binary_payload",
                Signature::method().optional("size", 8),
                |args, _| {
                    let size = args
                        .value("size")?
                        .as_i64()
                        .or_else(|| args.text("size").ok()?.parse().ok())
                        .ok_or_else(|| {
                            KeywordError::named("ValueError", "size must be an integer")
                        })?;
                    let size = u8::try_from(size).map_err(|_| {
                        KeywordError::named("ValueError", format!("size {size} is out of range"))
                    })?;
                    Ok(Value::bytes((0..size).collect::<Vec<u8>>()))
                },
            )
            .with_doc("Returns `size` bytes counting up from zero."),
        )
}
