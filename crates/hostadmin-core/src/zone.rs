//! Service subdomain records of the DNS zones

use hostadmin_config::ToolsConfig;
use regex::Regex;
use std::io::ErrorKind;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fsutil::write_atomic;
use crate::journal::{Journal, MessageKey};

/// Remove the first record line of each subdomain from the zone of `domain`
///
/// A record line starts with the subdomain, relative (`muc`) or fully
/// qualified (`muc.example.org.`), followed by blanks and `IN`.
pub fn remove_subdomain_records(zone: &str, domain: &str, subdomains: &[String]) -> String {
    let mut zone = zone.to_string();
    for sub in subdomains {
        let sub = regex::escape(sub);
        let pattern = format!(
            r"(?m)^(?:{sub}\.{domain}\.|{sub})[ \t]+IN.*$\n?",
            sub = sub,
            domain = regex::escape(domain)
        );
        match Regex::new(&pattern) {
            Ok(re) => zone = re.replacen(&zone, 1, "").into_owned(),
            Err(e) => debug!(error = %e, "skipping unusable subdomain pattern"),
        }
    }
    zone
}

/// Append a CNAME to `domain` for each subdomain
pub fn append_subdomain_cnames(zone: &str, domain: &str, subdomains: &[String]) -> String {
    let mut zone = zone.to_string();
    for sub in subdomains {
        zone.push_str(&format!("{}  IN  CNAME   {}.\n", sub, domain));
    }
    zone
}

/// Move the service subdomains from the zone of `old` to the zone of `new`
///
/// A missing old zone is ignored. A missing new zone raises a
/// `domain_zone_not_found` warning.
pub fn move_subdomains(
    config: &ToolsConfig,
    journal: &mut Journal,
    old: &str,
    new: &str,
) -> Result<()> {
    let subdomains = &config.domain.main_subdomains;

    let old_path = config.zone_file(old);
    match std::fs::read_to_string(&old_path) {
        Ok(zone) => {
            let updated = remove_subdomain_records(&zone, old, subdomains);
            write_atomic(&old_path, updated.as_bytes())?;
            debug!(zone = %old_path.display(), "removed service records");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(zone = %old_path.display(), "old zone absent");
        }
        Err(e) => return Err(Error::file(&old_path)(e)),
    }

    let new_path = config.zone_file(new);
    match std::fs::read_to_string(&new_path) {
        Ok(zone) => {
            let updated = append_subdomain_cnames(&zone, new, subdomains);
            write_atomic(&new_path, updated.as_bytes())?;
            debug!(zone = %new_path.display(), "added service records");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            journal.warning_with(MessageKey::DomainZoneNotFound, [("domain", new)]);
        }
        Err(e) => return Err(Error::file(&new_path)(e)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs() -> Vec<String> {
        vec!["pubsub".into(), "muc".into(), "vjud".into()]
    }

    const OLD_ZONE: &str = "\
$TTL 3600
@        IN  A       203.0.113.7
muc      IN  CNAME   old.example.
pubsub.old.example.  IN  CNAME  old.example.
vjud	IN  CNAME   old.example.
muc      IN  TXT     \"second record stays\"
mucous   IN  A       203.0.113.8
";

    #[test]
    fn test_removes_first_record_of_each_subdomain() {
        let zone = remove_subdomain_records(OLD_ZONE, "old.example", &subs());
        assert_eq!(
            zone,
            "$TTL 3600\n@        IN  A       203.0.113.7\nmuc      IN  TXT     \"second record stays\"\nmucous   IN  A       203.0.113.8\n"
        );
    }

    #[test]
    fn test_fqdn_of_other_domain_untouched() {
        let zone = "pubsub.other.example.  IN  CNAME  other.example.\n";
        assert_eq!(remove_subdomain_records(zone, "old.example", &subs()), zone);
    }

    #[test]
    fn test_append_cnames() {
        let zone = append_subdomain_cnames("@ IN A 203.0.113.7\n", "new.example", &subs());
        assert_eq!(
            zone,
            "@ IN A 203.0.113.7\npubsub  IN  CNAME   new.example.\nmuc  IN  CNAME   new.example.\nvjud  IN  CNAME   new.example.\n"
        );
    }
}
