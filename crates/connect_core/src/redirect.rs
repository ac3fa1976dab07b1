use shared::protocol::{
    PARAM_CLIENT_SECRET, PARAM_IS_FALL_BACK, PARAM_LINK_TOKEN, PARAM_WEBVIEW, PATH_BANK_LINK,
    PATH_INTRO,
};
use url::Url;

#[derive(Debug, Clone)]
pub struct RedirectBuilder {
    base_url: Url,
}

impl RedirectBuilder {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn build(&self, path: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(None);
        url.set_fragment(None);

        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params {
                pairs.append_pair(name, value);
            }
        }

        url
    }

    pub fn intro(&self, client_secret: &str) -> Url {
        self.build(
            PATH_INTRO,
            &[(PARAM_CLIENT_SECRET, client_secret), (PARAM_WEBVIEW, "true")],
        )
    }

    pub fn bank_link(&self, link_token: &str, fallback: bool) -> Url {
        if fallback {
            self.build(
                PATH_BANK_LINK,
                &[(PARAM_LINK_TOKEN, link_token), (PARAM_IS_FALL_BACK, "true")],
            )
        } else {
            self.build(PATH_BANK_LINK, &[(PARAM_LINK_TOKEN, link_token)])
        }
    }
}
