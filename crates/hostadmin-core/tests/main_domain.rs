//! Main domain query and switch

use hostadmin_core::testing::TestBed;
use hostadmin_core::{
    AdminContext, Error, ErrorKind, Journal, Level, MainDomain, MainDomainRequest, MessageKey,
    main_domain,
};

async fn authenticated(bed: &TestBed) -> AdminContext {
    let ctx = bed.context();
    ctx.directory.authenticate("yunohost").await.unwrap();
    ctx
}

#[smol_potat::test]
async fn test_query_changes_nothing() {
    let bed = TestBed::new();
    let before = bed.snapshot();

    let result = main_domain(&bed.context(), &mut Journal::new(), MainDomainRequest::query())
        .await
        .unwrap();

    assert_eq!(
        result,
        MainDomain::Current {
            current_main_domain: "yunohost.org".into()
        }
    );
    assert_eq!(bed.snapshot(), before);
    assert!(bed.runner.lines().is_empty());
    assert!(bed.services.actions().is_empty());
}

#[smol_potat::test]
async fn test_query_serializes_as_current_main_domain() {
    let bed = TestBed::new();
    let result = main_domain(&bed.context(), &mut Journal::new(), MainDomainRequest::query())
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"current_main_domain": "yunohost.org"})
    );
}

#[smol_potat::test]
async fn test_old_without_new_is_rejected() {
    let bed = TestBed::new();
    let before = bed.snapshot();
    let request = MainDomainRequest {
        old: Some("yunohost.org".into()),
        new: None,
        dyndns: false,
    };

    let err = main_domain(&bed.context(), &mut Journal::new(), request)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.message_key(), Some(MessageKey::NewDomainRequired));
    assert_eq!(bed.snapshot(), before);
}

#[smol_potat::test]
async fn test_switch_rewrites_everything() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    let config = bed.config.clone();
    bed.write(&config.zone_file("example.org"), "@  IN  A  198.51.100.4\n");
    let mut journal = Journal::new();

    let result = main_domain(&ctx, &mut journal, MainDomainRequest::set("example.org"))
        .await
        .unwrap();

    assert_eq!(
        result,
        MainDomain::Changed {
            old: "yunohost.org".into(),
            new: "example.org".into()
        }
    );
    assert_eq!(bed.read(&config.paths.current_host), "example.org\n");
    for file in &config.domain.files {
        let content = bed.read(file);
        assert!(content.contains("hostname = example.org"), "{}", file.display());
        assert!(!content.contains("yunohost.org"));
    }
    assert!(
        bed.directory
            .entry("virtualdomain=example.org,ou=domains")
            .is_some()
    );

    let old_zone = bed.read(&config.zone_file("yunohost.org"));
    assert!(!old_zone.contains("pubsub"));
    assert!(!old_zone.contains("muc"));
    assert!(old_zone.contains("203.0.113.7"));
    let new_zone = bed.read(&config.zone_file("example.org"));
    assert!(new_zone.ends_with(
        "pubsub  IN  CNAME   example.org.\nmuc  IN  CNAME   example.org.\nvjud  IN  CNAME   example.org.\n"
    ));

    let template = config.nginx_domain_dir("example.org").join("yunohost_local.conf");
    assert!(template.exists());
    #[cfg(unix)]
    assert_eq!(
        std::fs::read_link(&config.paths.ssl_cert_link).unwrap(),
        config.cert_dir("example.org").join("crt.pem")
    );

    assert_eq!(bed.services.restarted(), config.services.restart_order);
    assert_eq!(journal.level_of(MessageKey::MaindomainChanged), Some(Level::Success));
    assert!(!journal.contains(MessageKey::DomainZoneNotFound));
}

#[smol_potat::test]
async fn test_known_domain_is_not_registered_again() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    let mut attributes = hostadmin_config::Attributes::new();
    attributes.insert("virtualdomain".into(), vec!["example.org".into()]);
    bed.directory
        .seed("virtualdomain=example.org,ou=domains", attributes);

    main_domain(&ctx, &mut Journal::new(), MainDomainRequest::set("example.org"))
        .await
        .unwrap();

    assert!(bed.directory.added().is_empty());
}

#[smol_potat::test]
async fn test_missing_new_zone_warns() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    let mut journal = Journal::new();

    main_domain(&ctx, &mut journal, MainDomainRequest::set("example.org"))
        .await
        .unwrap();

    let warning = journal
        .events()
        .iter()
        .find(|event| event.key == MessageKey::DomainZoneNotFound)
        .unwrap();
    assert_eq!(warning.level, Level::Warning);
    assert_eq!(warning.params["domain"], "example.org");
    assert!(journal.contains(MessageKey::MaindomainChanged));
}

#[smol_potat::test]
async fn test_missing_domain_file_is_skipped() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    let skipped = bed.config.domain.files[1].clone();
    std::fs::remove_file(&skipped).unwrap();

    main_domain(&ctx, &mut Journal::new(), MainDomainRequest::set("example.org"))
        .await
        .unwrap();

    assert!(!skipped.exists());
    assert!(bed.read(&bed.config.domain.files[0]).contains("example.org"));
}

#[smol_potat::test]
async fn test_restart_failure_reports_index_without_rollback() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    bed.services.fail_restart_of("dovecot");
    let mut journal = Journal::new();

    let err = main_domain(&ctx, &mut journal, MainDomainRequest::set("example.org"))
        .await
        .unwrap_err();

    match &err {
        Error::StepFailed { index, step, .. } => {
            assert_eq!(*index, 7);
            assert_eq!(step, "restart dovecot");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.message_key(), Some(MessageKey::MaindomainChangeFailed));
    assert_eq!(bed.services.restarted(), vec!["metronome", "postfix", "dovecot"]);
    assert_eq!(bed.read(&bed.config.paths.current_host), "example.org\n");
    assert!(!journal.contains(MessageKey::MaindomainChanged));
}

#[smol_potat::test]
async fn test_dyndns_subscription_when_eligible() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    bed.dyndns.offer(&["nohost.me", "noho.st"]);
    let request = MainDomainRequest {
        dyndns: true,
        ..MainDomainRequest::set("myserver.nohost.me")
    };

    main_domain(&ctx, &mut Journal::new(), request).await.unwrap();

    assert_eq!(bed.dyndns.subscribed(), vec!["myserver.nohost.me"]);
}

#[smol_potat::test]
async fn test_dyndns_not_subscribed_outside_zones_or_offline() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    bed.dyndns.offer(&["nohost.me"]);
    let request = MainDomainRequest {
        dyndns: true,
        ..MainDomainRequest::set("example.org")
    };
    main_domain(&ctx, &mut Journal::new(), request).await.unwrap();
    assert!(bed.dyndns.subscribed().is_empty());

    bed.dyndns.go_offline();
    let request = MainDomainRequest {
        dyndns: true,
        ..MainDomainRequest::set("other.nohost.me")
    };
    main_domain(&ctx, &mut Journal::new(), request).await.unwrap();
    assert!(bed.dyndns.subscribed().is_empty());
}

#[smol_potat::test]
async fn test_switch_issues_certificate_for_new_domain() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    let config = bed.config.clone();
    let cert_dir = config.cert_dir("example.org");

    main_domain(&ctx, &mut Journal::new(), MainDomainRequest::set("example.org"))
        .await
        .unwrap();

    assert!(bed.runner.ran("openssl req -new"));
    assert!(bed.runner.ran("openssl ca"));
    assert_eq!(
        bed.read(&cert_dir.join("openssl.cnf")),
        "commonName_default = example.org\n"
    );
    assert!(!cert_dir.join("csr.pem").exists());
    assert!(config.paths.ssl_key_link.exists());
    assert!(config.paths.ssl_cert_link.exists());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(cert_dir.join("key.pem"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}

#[smol_potat::test]
async fn test_existing_certificate_is_reused() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    let cert_dir = bed.config.cert_dir("example.org");
    bed.write(&cert_dir.join("key.pem"), "key");
    bed.write(&cert_dir.join("crt.pem"), "crt");

    main_domain(&ctx, &mut Journal::new(), MainDomainRequest::set("example.org"))
        .await
        .unwrap();

    assert!(!bed.runner.ran("openssl"));
    assert_eq!(bed.read(&cert_dir.join("crt.pem")), "crt");
}

#[smol_potat::test]
async fn test_certificate_failure_stops_before_switch() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    bed.runner.fail_on("openssl ca");
    let mut journal = Journal::new();

    let err = main_domain(&ctx, &mut journal, MainDomainRequest::set("example.org"))
        .await
        .unwrap_err();

    match &err {
        Error::StepFailed { index, plan, .. } => {
            assert_eq!(*index, 3);
            assert_eq!(plan, "domain-certificate");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.message_key(), Some(MessageKey::DomainCertGenFailed));
    assert_eq!(bed.read(&bed.config.paths.current_host), "yunohost.org\n");
    assert!(bed.read(&bed.config.domain.files[0]).contains("yunohost.org"));
    assert!(bed.services.restarted().is_empty());
    assert!(!journal.contains(MessageKey::MaindomainChanged));
}

#[smol_potat::test]
async fn test_domain_with_path_separators_is_rejected() {
    let bed = TestBed::new();
    let ctx = authenticated(&bed).await;
    let before = bed.snapshot();

    for bad in ["../x", "a/b.org", "example.org."] {
        let err = main_domain(&ctx, &mut Journal::new(), MainDomainRequest::set(bad))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.message_key(), Some(MessageKey::DomainNameInvalid));
    }
    assert_eq!(bed.snapshot(), before);
    assert!(bed.directory.added().is_empty());
    assert!(bed.runner.lines().is_empty());
}
