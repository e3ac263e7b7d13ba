use dsd_trunk_core::ids::{Nac, SiteId, Sysid, Wacn};

/// Parse a `WACN:SYSID:NAC` triple in hex, as accepted by `--site` on
/// several subcommands.
pub fn parse_site(raw: &str) -> anyhow::Result<SiteId> {
    let mut parts = raw.split(':');
    let wacn = parts.next().ok_or_else(|| anyhow::anyhow!("missing WACN"))?;
    let sysid = parts.next().ok_or_else(|| anyhow::anyhow!("missing SYSID"))?;
    let nac = parts.next().ok_or_else(|| anyhow::anyhow!("missing NAC"))?;

    Ok(SiteId::new(
        Wacn(u32::from_str_radix(wacn, 16)?),
        Sysid(u16::from_str_radix(sysid, 16)?),
        Nac(u16::from_str_radix(nac, 16)?),
    ))
}
