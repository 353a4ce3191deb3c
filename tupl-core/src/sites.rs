//! Built-in destinations and the registry that maps identifiers to them.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;

use crate::error::SetupError;
use crate::protocol::{
    DeferredLinkProtocol, SiteDescriptor, SiteProtocol, SizeUnit, TokenFormProtocol,
};

/// Destinations selectable by name, kept in name order for help output.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: BTreeMap<String, SiteDescriptor>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every destination shipped with tupl.
    pub fn builtin() -> Result<Self, regex::Error> {
        let mut registry = Self::new();

        registry.register(
            "dlfree",
            SiteDescriptor::new(
                "http://dl.free.fr/",
                SiteDescriptor::size_limit(1.0, SizeUnit::GB),
                Arc::new(dl_free()?),
            ),
        );

        let anon: Arc<dyn SiteProtocol> = Arc::new(anon_family()?);
        for (id, url) in [
            ("anonfile", "https://anonfile.com/"),
            ("bayfile", "https://bayfiles.com/"),
            ("letsupload", "https://letsupload.cc/"),
            ("minfil", "https://minfil.com/"),
            ("myfile", "https://myfile.is/"),
        ] {
            registry.register(
                id,
                SiteDescriptor::new(
                    url,
                    SiteDescriptor::size_limit(20.0, SizeUnit::GB),
                    Arc::clone(&anon),
                ),
            );
        }
        Ok(registry)
    }

    pub fn register(&mut self, id: impl Into<String>, site: SiteDescriptor) {
        self.sites.insert(id.into(), site);
    }

    pub fn get(&self, id: &str) -> Result<&SiteDescriptor, SetupError> {
        self.sites
            .get(id)
            .ok_or_else(|| SetupError::UnknownSite(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    /// `(id: url) (id: url) ...`, for help text.
    pub fn describe(&self) -> String {
        self.sites
            .iter()
            .map(|(id, site)| format!("({id}: {})", site.base_url))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn anon_family() -> Result<TokenFormProtocol, regex::Error> {
    Ok(TokenFormProtocol::new(
        Regex::new(r#"name="_token" value="(.*?)""#)?,
        Regex::new(r#"file-input" type="text" value="(.*?)""#)?,
        "_token",
        "file",
    ))
}

fn dl_free() -> Result<DeferredLinkProtocol, regex::Error> {
    let protocol = DeferredLinkProtocol::new(
        "index_nojs.pl",
        Regex::new(r#"<form action="/(.*?)" enctype="multipart/form-data""#)?,
        Regex::new(r#"suivante: <a class="underline" href="(.*?)""#)?,
        "ufile",
    );
    Ok(["mail1", "mail2", "mail3", "mail4", "message"]
        .into_iter()
        .fold(protocol, |p, field| p.with_field(field, "")))
}
