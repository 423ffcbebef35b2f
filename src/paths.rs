// src/paths.rs

//! Common output path resolution for aggregate reporting.

/// Longest common prefix of all paths, computed by stripping trailing
/// path segments from the first path until it prefixes every other path.
///
/// Prefixing is plain string prefixing, with both `/` and `\` treated as
/// segment separators. If nothing is shared but the first path is
/// absolute, the root separator is returned.
pub fn common_output_path<'a, I>(paths: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut iter = paths.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };

    let mut common = first.to_string();
    for path in iter {
        while !path.starts_with(&common) && contains_separator(&common) {
            strip_last_segment(&mut common);
        }
    }

    if common.is_empty() && first.starts_with('/') {
        return "/".to_string();
    }
    common
}

fn contains_separator(s: &str) -> bool {
    s.contains(['/', '\\'])
}

/// Drop the final `<separator><segment>` of `s`.
fn strip_last_segment(s: &mut String) {
    match s.rfind(['/', '\\']) {
        Some(idx) => s.truncate(idx),
        None => s.clear(),
    }
}

#[cfg(test)]
mod tests {
    use super::common_output_path;

    #[test]
    fn shared_parent_directory() {
        let paths = ["/proj/dist/app1", "/proj/dist/app2"];
        assert_eq!(common_output_path(paths), "/proj/dist");
    }

    #[test]
    fn identical_paths_stay_untouched() {
        let paths = ["/proj/dist", "/proj/dist"];
        assert_eq!(common_output_path(paths), "/proj/dist");
    }

    #[test]
    fn disjoint_absolute_paths_fall_back_to_root() {
        let paths = ["/proj/dist", "/other/out"];
        assert_eq!(common_output_path(paths), "/");
    }

    #[test]
    fn disjoint_relative_paths_collapse_to_empty() {
        let paths = ["proj/dist", "other/out"];
        assert_eq!(common_output_path(paths), "");
    }

    #[test]
    fn prefixing_is_string_based_not_segment_based() {
        // "dist2" shares the "dist" prefix as a string; mirror that
        // behaviour rather than segment-wise comparison.
        let paths = ["/proj/dist", "/proj/dist2/app"];
        assert_eq!(common_output_path(paths), "/proj/dist");
    }

    #[test]
    fn single_path_is_its_own_common_prefix() {
        assert_eq!(common_output_path(["/proj/dist/app1"]), "/proj/dist/app1");
    }

    #[test]
    fn empty_set_yields_empty_path() {
        assert_eq!(common_output_path(std::iter::empty::<&str>()), "");
    }

    #[test]
    fn backslash_paths_are_stripped_the_same_way() {
        let paths = ["C:\\proj\\dist\\app1", "C:\\proj\\dist\\app2"];
        assert_eq!(common_output_path(paths), "C:\\proj\\dist");
    }
}
