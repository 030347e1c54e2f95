//! # Utility Functions Module
//!
//! Small helpers shared by the transcoder and the CLI output.

/// Converts an iterable of string-like items to `Vec<String>`.
///
/// Used to build external tool argument lists without a `.to_string()` on
/// every element.
///
/// # Example
/// ```rust
/// use media_crosspost::utils::to_string_vec;
///
/// let bitrate = 3500;
/// let args = to_string_vec(["-b:v", &format!("{}k", bitrate), "-an"]);
/// assert_eq!(args[1], "3500k");
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds an argument vector from mixed displayable values.
///
/// # Example
/// ```rust
/// use media_crosspost::args;
///
/// let crf = 23;
/// let args = args!["-crf", crf, "-preset", "veryfast"];
/// assert_eq!(args, vec!["-crf", "23", "-preset", "veryfast"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$($item.to_string()),*])
    };
}

/// Format byte count in human readable form
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
