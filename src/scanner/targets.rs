use std::{
    net::{Ipv4Addr, SocketAddrV4},
    ops::RangeInclusive,
    sync::Arc,
};

use super::InvalidRequest;

/// Parse a seed address. Each of the four dot-separated parts must be an
/// integer in 0-255.
///
/// This is a bit looser than [`Ipv4Addr`]'s `FromStr` (leading zeros are
/// fine), since seeds are typed by hand.
pub fn parse_seed(input: &str) -> Result<Ipv4Addr, InvalidRequest> {
    let invalid = || InvalidRequest::Seed(input.to_string());

    let mut octets = [0u8; 4];
    let mut parts = input.trim().split('.');
    for octet in &mut octets {
        let part = parts.next().ok_or_else(invalid)?;
        *octet = part.trim().parse::<u8>().map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok(Ipv4Addr::from(octets))
}

/// An infinite sequence of addresses that starts at a seed and steps through
/// the whole IPv4 space, last octet first.
///
/// The octets are kept as four separate counters and carried one at a time,
/// and the wraparound back to `0.0.0.0` is only checked on the first octet
/// after every carry has been applied. Clone it (or make a new one from the
/// same seed) to restart.
#[derive(Debug, Clone)]
pub struct AddressSequence {
    octets: [u16; 4],
}

impl AddressSequence {
    pub fn new(seed: Ipv4Addr) -> Self {
        Self {
            octets: seed.octets().map(u16::from),
        }
    }

    fn current(&self) -> Ipv4Addr {
        // octets are always back in 0..=255 after a step
        let [a, b, c, d] = self.octets.map(|o| o as u8);
        Ipv4Addr::new(a, b, c, d)
    }

    fn step(&mut self) {
        self.octets[3] += 1;
        for i in (1..=3).rev() {
            if self.octets[i] > 255 {
                self.octets[i] = 0;
                self.octets[i - 1] += 1;
            }
        }
        if self.octets[0] > 255 {
            self.octets = [0; 4];
        }
    }

    /// Jump to whatever comes after `addr`, as if we'd stepped all the way
    /// there.
    fn step_past(&mut self, addr: Ipv4Addr) {
        self.octets = addr.octets().map(u16::from);
        self.step();
    }
}

impl Iterator for AddressSequence {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        let addr = self.current();
        self.step();
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

/// An inclusive range of ports. `start <= end` is checked on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, InvalidRequest> {
        if start > end {
            return Err(InvalidRequest::PortRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// The number of ports in the range. Never zero.
    pub fn count(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }

    pub fn iter(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl IntoIterator for PortRange {
    type Item = u16;
    type IntoIter = RangeInclusive<u16>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Every address and port we're going to probe, address-major: the whole
/// port range is exhausted before moving on to the next address.
#[derive(Debug, Clone)]
pub struct Candidates {
    addresses: AddressSequence,
    ports: PortRange,
    /// How many more addresses we're allowed to take from the sequence. None
    /// means forever.
    remaining_addresses: Option<u64>,
    exclude: Arc<Ipv4Ranges>,
    current: Option<(Ipv4Addr, RangeInclusive<u16>)>,
}

impl Candidates {
    pub fn new(
        seed: Ipv4Addr,
        ports: PortRange,
        max_addresses: Option<u64>,
        exclude: Arc<Ipv4Ranges>,
    ) -> Self {
        Self {
            addresses: AddressSequence::new(seed),
            ports,
            remaining_addresses: max_addresses,
            exclude,
            current: None,
        }
    }

    /// The total number of candidates, ignoring exclusions. None if the scan
    /// is unbounded.
    pub fn total(&self) -> Option<u64> {
        self.remaining_addresses
            .map(|addresses| addresses.saturating_mul(u64::from(self.ports.count())))
    }

    fn next_address(&mut self) -> Option<Ipv4Addr> {
        // a full lap where everything was excluded means there's nothing left
        let mut skipped: u64 = 0;
        loop {
            if self.remaining_addresses == Some(0) {
                return None;
            }

            let addr = self.addresses.current();
            let Some(&range) = self.exclude.range_containing(addr) else {
                self.addresses.step();
                if let Some(remaining) = &mut self.remaining_addresses {
                    *remaining -= 1;
                }
                return Some(addr);
            };

            // the rest of the excluded range, including this address
            let span = u64::from(u32::from(range.end)) - u64::from(u32::from(addr)) + 1;
            if let Some(remaining) = &mut self.remaining_addresses {
                if *remaining <= span {
                    *remaining = 0;
                    return None;
                }
                *remaining -= span;
            }
            self.addresses.step_past(range.end);

            skipped += span;
            if skipped > u64::from(u32::MAX) {
                return None;
            }
        }
    }
}

impl Iterator for Candidates {
    type Item = SocketAddrV4;

    fn next(&mut self) -> Option<SocketAddrV4> {
        loop {
            if let Some((addr, ports)) = &mut self.current {
                if let Some(port) = ports.next() {
                    return Some(SocketAddrV4::new(*addr, port));
                }
            }
            let addr = self.next_address()?;
            self.current = Some((addr, self.ports.iter()));
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Ipv4Range {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

impl Ipv4Range {
    pub fn single(addr: Ipv4Addr) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }
}

/// A set of address ranges we never probe, sorted by start address.
#[derive(Debug, Default, Clone)]
pub struct Ipv4Ranges {
    ranges: Vec<Ipv4Range>,
}

impl Ipv4Ranges {
    /// Overlapping and touching ranges are merged so lookups can binary
    /// search.
    pub fn new(mut ranges: Vec<Ipv4Range>) -> Self {
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<Ipv4Range> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if u32::from(range.start) <= u32::from(last.end).saturating_add(1) => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }

        Self { ranges: merged }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.range_containing(addr).is_some()
    }

    pub fn range_containing(&self, addr: Ipv4Addr) -> Option<&Ipv4Range> {
        let first_after = self.ranges.partition_point(|r| r.start <= addr);
        first_after
            .checked_sub(1)
            .map(|i| &self.ranges[i])
            .filter(|r| r.end >= addr)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[Ipv4Range] {
        &self.ranges
    }

    /// The number of addresses covered.
    pub fn count(&self) -> u64 {
        self.ranges
            .iter()
            .map(|r| u64::from(u32::from(r.end)) - u64::from(u32::from(r.start)) + 1)
            .sum()
    }
}
