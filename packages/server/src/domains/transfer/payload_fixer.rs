//! Byte-level fix for one known TCX wire incompatibility: COROS exports a
//! bare `<Speed>` extension, the sink only accepts the Garmin `ns3:TPX`
//! namespaced form.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TCX_SPEED_EXTENSION: Regex =
        Regex::new(r"<Extensions>\s*<Speed>([^<]+)</Speed>\s*</Extensions>").unwrap();
}

/// Rewrites `<Extensions><Speed>X</Speed></Extensions>` to the namespaced
/// form the sink expects. A no-op for any other format; idempotent.
pub fn fix_tcx_extensions(content: &str) -> String {
    TCX_SPEED_EXTENSION
        .replace_all(
            content,
            "<Extensions><ns3:TPX><ns3:Speed>$1</ns3:Speed></ns3:TPX></Extensions>",
        )
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_bare_speed_extension() {
        let input = "<Extensions><Speed>3.2</Speed></Extensions>";
        let expected = "<Extensions><ns3:TPX><ns3:Speed>3.2</ns3:Speed></ns3:TPX></Extensions>";
        assert_eq!(fix_tcx_extensions(input), expected);
    }

    #[test]
    fn tolerates_whitespace_between_tags() {
        let input = "<Extensions>\n  <Speed>1.0</Speed>\n</Extensions>";
        let expected = "<Extensions><ns3:TPX><ns3:Speed>1.0</ns3:Speed></ns3:TPX></Extensions>";
        assert_eq!(fix_tcx_extensions(input), expected);
    }

    #[test]
    fn is_idempotent() {
        let input = "<Extensions><Speed>3.2</Speed></Extensions>";
        let once = fix_tcx_extensions(input);
        let twice = fix_tcx_extensions(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn leaves_unrelated_content_untouched() {
        let input = "<TrainingCenterDatabase><Activities/></TrainingCenterDatabase>";
        assert_eq!(fix_tcx_extensions(input), input);
    }
}
