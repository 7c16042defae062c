//! OPC part-name helpers.

/// Relationship part for `part`, e.g. `xl/_rels/workbook.xml.rels`.
pub fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship `target` relative to the part that owns the `.rels`.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    // Part names never carry a fragment.
    let target = target.split('#').next().unwrap_or(target);
    if target.is_empty() {
        return normalize(source_part);
    }
    if let Some(target) = target.strip_prefix('/') {
        return normalize(target);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

/// Target for a relationship from `source_part` to `part`, relative to the
/// source directory (`worksheets/sheet1.xml` from `xl/workbook.xml`).
pub fn relative_target(source_part: &str, part: &str) -> String {
    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    let base: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    let target: Vec<&str> = part.split('/').filter(|s| !s.is_empty()).collect();
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out: Vec<&str> = std::iter::repeat("..").take(base.len() - common).collect();
    out.extend_from_slice(&target[common..]);
    out.join("/")
}

/// Trailing number of a part's file stem: `xl/worksheets/sheet12.xml` is 12.
pub fn part_number(part: &str) -> Option<u32> {
    let file_name = part.rsplit('/').next().unwrap_or(part);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    stem[stem.len() - digits..].parse().ok()
}

pub(crate) fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rels_for_part_in_root_and_subdir() {
        assert_eq!(rels_for_part("workbook.xml"), "_rels/workbook.xml.rels");
        assert_eq!(rels_for_part("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
    }

    #[test]
    fn resolve_target_relative_to_source_dir() {
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../comments1.xml"),
            "xl/comments1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml#frag"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(resolve_target("xl/workbook.xml", "#x"), "xl/workbook.xml");
    }

    #[test]
    fn resolve_target_absolute_paths_are_normalized() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/./worksheets/../styles.xml"),
            "xl/styles.xml"
        );
    }

    #[test]
    fn part_number_reads_the_stem_suffix() {
        assert_eq!(part_number("xl/worksheets/sheet12.xml"), Some(12));
        assert_eq!(part_number("xl/comments3.xml"), Some(3));
        assert_eq!(part_number("xl/worksheets/data.xml"), None);
    }

    #[test]
    fn relative_target_inverts_resolve() {
        assert_eq!(
            relative_target("xl/workbook.xml", "xl/worksheets/sheet1.xml"),
            "worksheets/sheet1.xml"
        );
        assert_eq!(
            relative_target("xl/worksheets/sheet1.xml", "xl/comments1.xml"),
            "../comments1.xml"
        );
        let target = relative_target("xl/worksheets/sheet2.xml", "xl/drawings/vmlDrawing2.vml");
        assert_eq!(
            resolve_target("xl/worksheets/sheet2.xml", &target),
            "xl/drawings/vmlDrawing2.vml"
        );
    }
}
