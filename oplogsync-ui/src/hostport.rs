// Validates the `--from`/`--to` command-line surface (§6): `host:port`
// with exactly one colon and a port in range. The original string is kept
// verbatim (not re-split into a struct) because the driver seam's `dial`
// takes the whole "host:port" string as-is.

pub fn parse_hostport(s: &str) -> Result<String, String> {
    let (host, port) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid hostportstr {s:?}: expected host:port"))?;
    if host.is_empty() {
        return Err(format!("invalid hostportstr {s:?}: empty host"));
    }
    let port: u32 = port
        .parse()
        .map_err(|_| format!("invalid hostportstr {s:?}: port must be a number"))?;
    if port > 65535 {
        return Err(format!("invalid hostportstr {s:?}: port out of range"));
    }
    Ok(s.to_string())
}
