const UNITS: [(&str, u64); 3] = [("G", 1_000_000_000), ("M", 1_000_000), ("K", 1_000)];

/// Renders a byte count the way the status page shows it: `100`, `1.1K`,
/// `10K`, `1.1M`, ... The largest tier the size reaches wins.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(size: u64) -> String {
    for (unit, per_unit) in UNITS {
        if size >= per_unit {
            if size / per_unit >= 10 {
                return format!("{}{unit}", size / per_unit);
            }
            return format!("{:.1}{unit}", size as f64 / per_unit as f64);
        }
    }
    size.to_string()
}
