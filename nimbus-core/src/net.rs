//! IPv4 CIDR blocks and subnet layout

use std::net::Ipv4Addr;

use crate::error::{CoreError, Result};

/// An aligned IPv4 network block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    base: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn parse(block: &str) -> Result<Self> {
        let (addr, prefix) = block
            .split_once('/')
            .ok_or_else(|| CoreError::cidr(block, "missing '/' prefix length"))?;

        let base: Ipv4Addr = addr
            .parse()
            .map_err(|_| CoreError::cidr(block, "invalid IPv4 address"))?;

        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CoreError::cidr(block, "invalid prefix length"))?;

        if prefix > 32 {
            return Err(CoreError::cidr(block, "prefix length exceeds 32"));
        }

        if u32::from(base) & !mask(prefix) != 0 {
            return Err(CoreError::cidr(block, "host bits set in base address"));
        }

        Ok(Self { base, prefix })
    }

    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Splits the block into `count` equally sized, consecutive blocks
    ///
    /// The block is divided into the next power of two at or above `count`;
    /// trailing blocks beyond `count` are left unallocated.
    pub fn split(&self, count: usize) -> Result<Vec<Ipv4Cidr>> {
        if count == 0 {
            return Err(CoreError::cidr(self.to_string(), "cannot split into zero blocks"));
        }

        let extra_bits = count.next_power_of_two().trailing_zeros();
        let prefix = u32::from(self.prefix) + extra_bits;
        if prefix > 32 {
            return Err(CoreError::cidr(
                self.to_string(),
                format!("too small for {} blocks", count),
            ));
        }

        let size = 1u64 << (32 - prefix);
        let base = u64::from(u32::from(self.base));

        Ok((0..count as u64)
            .map(|i| Ipv4Cidr {
                base: Ipv4Addr::from((base + i * size) as u32),
                prefix: prefix as u8,
            })
            .collect())
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_vpc_into_four_subnets() {
        let vpc = Ipv4Cidr::parse("10.0.0.0/16").unwrap();
        let subnets: Vec<String> = vpc.split(4).unwrap().iter().map(|c| c.to_string()).collect();

        assert_eq!(
            subnets,
            vec!["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18", "10.0.192.0/18"]
        );
    }

    #[test]
    fn test_split_rounds_up_to_power_of_two() {
        let vpc = Ipv4Cidr::parse("10.0.0.0/16").unwrap();
        let subnets = vpc.split(3).unwrap();

        assert_eq!(subnets.len(), 3);
        assert!(subnets.iter().all(|s| s.prefix() == 18));
        assert_eq!(subnets[2].to_string(), "10.0.128.0/18");
    }

    #[test]
    fn test_parse_rejects_bad_blocks() {
        assert!(Ipv4Cidr::parse("10.0.0.0").is_err());
        assert!(Ipv4Cidr::parse("10.0.0.0/33").is_err());
        assert!(Ipv4Cidr::parse("10.0.0.1/16").is_err());
        assert!(Ipv4Cidr::parse("10.0.0/16").is_err());
    }

    #[test]
    fn test_split_too_small() {
        let block = Ipv4Cidr::parse("10.0.0.0/31").unwrap();
        assert!(block.split(4).is_err());
        assert!(block.split(0).is_err());
    }
}
