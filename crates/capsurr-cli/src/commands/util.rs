/// Worker count for `--threads`: "auto" (or anything unparsable) means one
/// per CPU.
pub fn parse_threads(spec: &str) -> usize {
    if spec.eq_ignore_ascii_case("auto") {
        return num_cpus::get();
    }
    match spec.parse::<usize>() {
        Ok(0) | Err(_) => num_cpus::get(),
        Ok(count) => count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_counts_are_kept() {
        assert_eq!(parse_threads("3"), 3);
    }

    #[test]
    fn auto_and_garbage_use_cpu_count() {
        assert_eq!(parse_threads("AUTO"), num_cpus::get());
        assert_eq!(parse_threads("many"), num_cpus::get());
        assert_eq!(parse_threads("0"), num_cpus::get());
    }
}
