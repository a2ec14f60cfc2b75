//! Commands that inspect configuration or clean up without crawling.

use std::sync::Arc;
use std::time::Duration;

use pricecrawl_core::{AppConfig, RetailerAdapter, RetailersFile};
use pricecrawl_scraper::{ArtifactStore, ChromiumBrowser, CrawlConfig};

use crate::crawl::{select_targets, Session};

/// One line per retailer: slug, name, listing URL, seeds, enabled flag.
pub(crate) fn format_retailers(retailers: &RetailersFile) -> Vec<String> {
    retailers
        .retailers
        .iter()
        .map(|r| {
            format!(
                "{:<14} {:<12} {:<44} seeds={:<2} {}",
                r.slug(),
                r.name,
                r.listing_url(),
                r.seed_categories.len(),
                if r.enabled { "enabled" } else { "disabled" }
            )
        })
        .collect()
}

pub(crate) fn run_retailers(config: &AppConfig) -> anyhow::Result<()> {
    let retailers = pricecrawl_core::load_retailers(&config.retailers_path)?;
    for line in format_retailers(&retailers) {
        println!("{line}");
    }
    Ok(())
}

/// Prints the validated category frontier for `store` without extracting.
pub(crate) async fn run_discover(config: &AppConfig, store: &str) -> anyhow::Result<()> {
    let retailers = pricecrawl_core::load_retailers(&config.retailers_path)?;
    let adapter = select_targets(&retailers, Some(store))?.remove(0);

    let session = Session {
        crawl_config: Arc::new(CrawlConfig::from_app_config(config)),
        sink: None,
        vision: None,
        artifact_root: config.artifact_dir.clone(),
        resume: false,
    };
    let browser = ChromiumBrowser::launch(
        config.headless,
        Duration::from_secs(config.nav_timeout_secs),
    )
    .await?;

    let result = session.orchestrator(&adapter).discover(&browser).await;
    if let Err(e) = browser.shutdown().await {
        tracing::warn!(error = %e, "browser shutdown failed");
    }

    let categories = result?;
    println!("{}: {} categories", adapter.slug(), categories.len());
    for category in &categories {
        let estimate = category
            .estimated_product_count
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        println!("  {:<32} ~{estimate:<6} {}", category.name, category.url);
    }
    Ok(())
}

/// Removes leftover screenshots under the artifact root and each store's
/// subdirectory.
pub(crate) async fn run_sweep(config: &AppConfig) -> anyhow::Result<()> {
    let retailers = pricecrawl_core::load_retailers(&config.retailers_path)?;
    let removed = sweep_artifacts(&config.artifact_dir, &retailers.retailers).await?;
    println!("removed {removed} screenshot(s)");
    Ok(())
}

pub(crate) async fn sweep_artifacts(
    root: &std::path::Path,
    retailers: &[RetailerAdapter],
) -> anyhow::Result<usize> {
    let mut removed = ArtifactStore::new(root).sweep().await?;
    for retailer in retailers {
        removed += ArtifactStore::new(root.join(retailer.slug())).sweep().await?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use pricecrawl_core::parse_retailers;

    use super::*;

    fn retailers() -> RetailersFile {
        parse_retailers(
            r#"
retailers:
  - name: Checkers
    base_url: https://www.checkers.co.za
    listing_url: https://www.checkers.co.za/c-2256/All-Departments
    category_path_pattern: "^/c-\\d+/"
    seed_categories:
      - { name: Dairy, url: /c-2413/All-Departments/Food/Fresh-Food/Milk-Butter-and-Eggs }
    selectors:
      card: [".product-frame"]
  - name: Makro
    base_url: https://www.makro.co.za
    category_path_pattern: "^/c/"
    enabled: false
    selectors:
      card: [".product-tile"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn retailer_lines_show_slug_and_state() {
        let lines = format_retailers(&retailers());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("checkers"));
        assert!(lines[0].contains("c-2256/All-Departments"));
        assert!(lines[0].contains("seeds=1"));
        assert!(lines[0].ends_with("enabled"));
        assert!(lines[1].contains("https://www.makro.co.za"));
        assert!(lines[1].ends_with("disabled"));
    }

    #[tokio::test]
    async fn sweep_clears_root_and_store_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let checkers = dir.join("checkers");
        std::fs::create_dir_all(&checkers).unwrap();
        std::fs::write(dir.join("shot-a.png"), b"x").unwrap();
        std::fs::write(checkers.join("shot-b.png"), b"x").unwrap();
        std::fs::write(checkers.join("keep.txt"), b"x").unwrap();

        let removed = sweep_artifacts(dir, &retailers().retailers).await.unwrap();

        assert_eq!(removed, 2);
        assert!(checkers.join("keep.txt").exists());
    }
}
