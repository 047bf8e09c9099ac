use std::collections::BTreeMap;

/// Parse line-oriented `key: value` output (`dominfo`, `net-info`,
/// `pool-info`). Keys are lowercased with any trailing colon stripped;
/// values are trimmed. Lines with a colon split there; otherwise the first
/// whitespace run splits (`net-info` emits both forms). Lines with no
/// delimiter at all are skipped.
pub fn key_value_lines(output: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (key, value) = if let Some((key, value)) = line.split_once(':') {
            (key, value)
        } else if let Some((key, value)) = line.split_once(char::is_whitespace) {
            (key, value)
        } else {
            continue;
        };
        let key = key.trim().trim_end_matches(':').to_lowercase();
        map.insert(key, value.trim().to_owned());
    }
    map
}

/// First column of a `virsh *-list` table, skipping the two header lines
/// (column names and the dashed rule).
pub fn table_names(output: &str) -> Vec<String> {
    output
        .trim()
        .lines()
        .skip(2)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

/// Table body lines (beyond the two-line header), trimmed, for outputs kept
/// verbatim such as `vol-list`.
pub fn table_lines(output: &str) -> Vec<String> {
    output
        .trim()
        .lines()
        .skip(2)
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty())
        .collect()
}
