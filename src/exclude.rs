use std::{fs, net::Ipv4Addr, path::Path, str::FromStr};

use eyre::{WrapErr, eyre};

use crate::scanner::targets::{Ipv4Range, Ipv4Ranges};

pub fn parse_file(path: impl AsRef<Path>) -> eyre::Result<Ipv4Ranges> {
    let path = path.as_ref();
    let input = fs::read_to_string(path)
        .wrap_err_with(|| format!("reading exclude file {}", path.display()))?;

    parse(&input)
}

pub fn parse(input: &str) -> eyre::Result<Ipv4Ranges> {
    let mut ranges = Vec::new();

    for line in input.lines() {
        // remove everything after the first #
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        // can be either like 0.0.0.0-0.0.0.0 or 0.0.0.0/32
        let range = match (line.split_once('/'), line.split_once('-')) {
            (Some(_), Some(_)) => {
                return Err(eyre!(
                    "Invalid exclude range: {line} (cannot contain both - and /)"
                ));
            }
            (Some((ip, prefix)), None) => parse_cidr(ip.trim(), prefix.trim())
                .wrap_err_with(|| format!("Invalid exclude range: {line}"))?,
            (None, Some((start, end))) => {
                let start = Ipv4Addr::from_str(start.trim())?;
                let end = Ipv4Addr::from_str(end.trim())?;
                if start > end {
                    return Err(eyre!(
                        "Invalid exclude range: {line} (start cannot be greater than end)"
                    ));
                }
                Ipv4Range { start, end }
            }
            (None, None) => Ipv4Range::single(Ipv4Addr::from_str(line)?),
        };

        ranges.push(range);
    }

    Ok(Ipv4Ranges::new(ranges))
}

fn parse_cidr(ip: &str, prefix: &str) -> eyre::Result<Ipv4Range> {
    let prefix = prefix.parse::<u8>()?;
    if prefix > 32 {
        return Err(eyre!("prefix length {prefix} is greater than 32"));
    }

    let host_bits = u32::from(32 - prefix);
    let mask_bits = match host_bits {
        32 => u32::MAX,
        bits => (1 << bits) - 1,
    };

    let ip = u32::from(Ipv4Addr::from_str(ip)?);
    Ok(Ipv4Range {
        start: Ipv4Addr::from(ip & !mask_bits),
        end: Ipv4Addr::from(ip | mask_bits),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exclude() {
        let ranges = parse(
            "
            # bogons
            0.0.0.0/8
            10.0.0.0 - 10.0.0.255 # private

            192.168.1.7
            ",
        )
        .unwrap();

        assert_eq!(
            ranges.ranges(),
            &[
                Ipv4Range {
                    start: Ipv4Addr::new(0, 0, 0, 0),
                    end: Ipv4Addr::new(0, 255, 255, 255),
                },
                Ipv4Range {
                    start: Ipv4Addr::new(10, 0, 0, 0),
                    end: Ipv4Addr::new(10, 0, 0, 255),
                },
                Ipv4Range::single(Ipv4Addr::new(192, 168, 1, 7)),
            ]
        );
    }

    #[test]
    fn test_parse_cidr_edges() {
        let everything = parse("1.2.3.4/0").unwrap();
        assert_eq!(
            everything.ranges(),
            &[Ipv4Range {
                start: Ipv4Addr::new(0, 0, 0, 0),
                end: Ipv4Addr::new(255, 255, 255, 255),
            }]
        );

        let one = parse("1.2.3.4/32").unwrap();
        assert_eq!(one.ranges(), &[Ipv4Range::single(Ipv4Addr::new(1, 2, 3, 4))]);

        let block = parse("1.2.3.4/24").unwrap();
        assert_eq!(
            block.ranges(),
            &[Ipv4Range {
                start: Ipv4Addr::new(1, 2, 3, 0),
                end: Ipv4Addr::new(1, 2, 3, 255),
            }]
        );
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(parse("1.2.3.4/24-1.2.3.5").is_err());
        assert!(parse("1.2.3.9-1.2.3.4").is_err());
        assert!(parse("1.2.3.4/33").is_err());
        assert!(parse("not an ip").is_err());
    }
}
