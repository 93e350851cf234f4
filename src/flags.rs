/// Scale overrides packed into one string, e.g. `P1.5T0.8E1V1.1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleFlags {
    pub pscale: Option<f64>,
    pub tscale: Option<f64>,
    pub escale: Option<f64>,
    pub vscale: Option<f64>,
}

impl std::str::FromStr for ScaleFlags {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = ScaleFlags::default();

        let s = s.replace(['/', ' '], "");
        let chars: Vec<char> = s.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let letter = chars[i].to_ascii_uppercase();
            let slot = match letter {
                'P' => &mut flags.pscale,
                'T' => &mut flags.tscale,
                'E' => &mut flags.escale,
                'V' => &mut flags.vscale,
                _ => {
                    i += 1;
                    continue;
                }
            };
            let mut end = i + 1;
            while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                end += 1;
            }
            let value: String = chars[i + 1..end].iter().collect();
            let value = value
                .parse::<f64>()
                .map_err(|e| anyhow::anyhow!("Invalid value for flag {}: '{}' ({})", letter, value, e))?;
            if value <= 0.0 {
                anyhow::bail!("Flag {} must be positive, got {}", letter, value);
            }
            *slot = Some(value);
            i = end;
        }

        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_flags() {
        let flags: ScaleFlags = "P1.5T0.8E1V1.1".parse().unwrap();
        assert_eq!(flags.pscale, Some(1.5));
        assert_eq!(flags.tscale, Some(0.8));
        assert_eq!(flags.escale, Some(1.0));
        assert_eq!(flags.vscale, Some(1.1));
    }

    #[test]
    fn test_case_and_unknown_letters() {
        let flags: ScaleFlags = "g5/p2x".parse().unwrap();
        assert_eq!(flags.pscale, Some(2.0));
        assert_eq!(flags.tscale, None);
        assert_eq!("".parse::<ScaleFlags>().unwrap(), ScaleFlags::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!("P".parse::<ScaleFlags>().is_err());
        assert!("T0".parse::<ScaleFlags>().is_err());
    }
}
