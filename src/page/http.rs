//! Live session against a Sona Systems site over plain HTTP(S).
//!
//! Login is a standard ASP.NET WebForms postback: the login page carries
//! hidden state inputs (`__VIEWSTATE`, `__EVENTVALIDATION`, ...) that must be
//! echoed back together with the credential inputs and the submit button.
//! The auth cookie is then kept by reqwest's cookie store.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{header, Client, Url};
use scraper::{Html, Selector};
use std::time::Duration;

use super::extract;
use super::SiteSession;

/// Element ids on the login page and the post-login landing page.
#[derive(Debug, Clone)]
pub struct LoginFieldIds {
    pub username: String,
    pub password: String,
    pub submit: String,
    pub listing_link: String,
}

impl Default for LoginFieldIds {
    fn default() -> Self {
        Self {
            username: "ctl00_ContentPlaceHolder1_userid".into(),
            password: "ctl00_ContentPlaceHolder1_pw".into(),
            submit: "ctl00_ContentPlaceHolder1_default_auth_button".into(),
            listing_link: "lnkStudySignupLink".into(),
        }
    }
}

pub struct HttpSession {
    client: Client,
    ids: LoginFieldIds,
    timeout: Duration,
    current_url: Option<Url>,
    page: String,
}

fn build_client() -> Result<Client> {
    Client::builder()
        .cookie_store(true)
        .user_agent(concat!("rps-study-notifier/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("building http client")
}

impl HttpSession {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            ids: LoginFieldIds::default(),
            timeout: Duration::from_secs(30),
            current_url: None,
            page: String::new(),
        })
    }

    /// Per-request timeout for every site GET and POST.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn current_url(&self) -> Result<&Url> {
        self.current_url
            .as_ref()
            .ok_or_else(|| anyhow!("session not opened"))
    }

    /// Store the response body and the final (post-redirect) URL.
    async fn accept(&mut self, resp: reqwest::Response, what: &str) -> Result<()> {
        let resp = resp
            .error_for_status()
            .with_context(|| format!("{what}: non-2xx"))?;
        let url = resp.url().clone();
        let body = resp
            .text()
            .await
            .with_context(|| format!("{what}: reading body"))?;
        tracing::debug!(target: "session", %url, bytes = body.len(), "{what}");
        self.current_url = Some(url);
        self.page = body;
        Ok(())
    }

    async fn get(&mut self, url: Url, what: &str) -> Result<()> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await
            .with_context(|| format!("{what}: request failed"))?;
        self.accept(resp, what).await
    }
}

#[async_trait::async_trait]
impl SiteSession for HttpSession {
    async fn open(&mut self, url: &str) -> Result<()> {
        let url = Url::parse(url).with_context(|| format!("invalid site url {url}"))?;
        self.get(url, "open login page").await
    }

    async fn submit_credentials(&mut self, username: &str, password: &str) -> Result<()> {
        let base = self.current_url()?.clone();
        let form = LoginForm::parse(&self.page, &self.ids)?;
        let action = base
            .join(&form.action)
            .with_context(|| format!("resolving login action {}", form.action))?;
        let body = form.into_body(username, password);

        let resp = self
            .client
            .post(action)
            .timeout(self.timeout)
            .form(&body)
            .send()
            .await
            .context("login post failed")?;
        self.accept(resp, "submit credentials").await?;

        if login_rejected(&self.page, &self.ids) {
            bail!("login rejected: credentials not accepted");
        }
        Ok(())
    }

    async fn navigate_to_listing_view(&mut self) -> Result<()> {
        let href = listing_view_href(&self.page, &self.ids)?;
        let url = self
            .current_url()?
            .join(&href)
            .with_context(|| format!("resolving study view link {href}"))?;
        self.get(url, "open study view").await
    }

    async fn reload(&mut self) -> Result<()> {
        let url = self.current_url()?.clone();
        self.get(url, "reload").await
    }

    async fn close(&mut self) -> Result<()> {
        self.current_url = None;
        self.page.clear();
        // Fresh client drops the auth cookie.
        self.client = build_client()?;
        Ok(())
    }

    fn page_source(&self) -> &str {
        &self.page
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// The site answers a rejected login with the same form again.
pub fn login_rejected(html: &str, ids: &LoginFieldIds) -> bool {
    extract::href_by_id(html, &ids.listing_link).is_none() && html.contains(&ids.password)
}

/// Target of the study-signup link on the landing page.
pub fn listing_view_href(html: &str, ids: &LoginFieldIds) -> Result<String> {
    let href = extract::href_by_id(html, &ids.listing_link)
        .ok_or_else(|| anyhow!("study signup link #{} not found", ids.listing_link))?;
    if href.trim_start().starts_with("javascript:") {
        bail!("study signup link is a script postback, not a plain link: {href}");
    }
    Ok(href)
}

/// The login `<form>` with every successful control it would submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub action: String,
    pub fields: Vec<(String, String)>,
    pub username_name: String,
    pub password_name: String,
    pub submit: Option<(String, String)>,
}

impl LoginForm {
    pub fn parse(html: &str, ids: &LoginFieldIds) -> Result<Self> {
        let doc = Html::parse_document(html);
        let form_sel = Selector::parse("form").map_err(|e| anyhow!("form selector: {e}"))?;
        let input_sel =
            Selector::parse("input[name]").map_err(|e| anyhow!("input selector: {e}"))?;

        let form = doc
            .select(&form_sel)
            .find(|f| {
                f.select(&input_sel)
                    .any(|i| i.value().id() == Some(ids.username.as_str()))
            })
            .ok_or_else(|| anyhow!("login form with #{} not found", ids.username))?;

        let mut fields = Vec::new();
        let mut username_name = None;
        let mut password_name = None;
        let mut submit = None;

        for input in form.select(&input_sel) {
            let el = input.value();
            let Some(name) = el.attr("name") else { continue };
            let value = el.attr("value").unwrap_or_default();
            let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
            let id = el.id();

            if id == Some(ids.username.as_str()) {
                username_name = Some(name.to_string());
                continue;
            }
            if id == Some(ids.password.as_str()) {
                password_name = Some(name.to_string());
                continue;
            }
            match kind.as_str() {
                "submit" | "image" | "button" => {
                    if id == Some(ids.submit.as_str()) {
                        submit = Some((name.to_string(), value.to_string()));
                    }
                }
                "checkbox" | "radio" => {
                    if el.attr("checked").is_some() {
                        fields.push((name.to_string(), value.to_string()));
                    }
                }
                _ => fields.push((name.to_string(), value.to_string())),
            }
        }

        Ok(Self {
            action: form.value().attr("action").unwrap_or_default().to_string(),
            fields,
            username_name: username_name
                .ok_or_else(|| anyhow!("username field #{} not found", ids.username))?,
            password_name: password_name
                .ok_or_else(|| anyhow!("password field #{} not found", ids.password))?,
            submit,
        })
    }

    /// Urlencoded body: carried fields, credentials, then the submit button.
    pub fn into_body(self, username: &str, password: &str) -> Vec<(String, String)> {
        let mut body = self.fields;
        body.push((self.username_name, username.to_string()));
        body.push((self.password_name, password.to_string()));
        if let Some(btn) = self.submit {
            body.push(btn);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = r#"
      <html><body>
      <form method="post" action="./Default.aspx?ReturnUrl=%2f" id="aspnetForm">
        <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="vs123" />
        <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="ev456" />
        <input name="ctl00$ContentPlaceHolder1$userid" type="text" id="ctl00_ContentPlaceHolder1_userid" />
        <input name="ctl00$ContentPlaceHolder1$pw" type="password" id="ctl00_ContentPlaceHolder1_pw" />
        <input type="checkbox" name="remember" value="on" />
        <input type="submit" name="ctl00$ContentPlaceHolder1$default_auth_button" value="Log In"
               id="ctl00_ContentPlaceHolder1_default_auth_button" />
        <input type="submit" name="other_button" value="Help" id="help" />
      </form>
      </body></html>"#;

    #[test]
    fn parses_aspnet_login_form() {
        let ids = LoginFieldIds::default();
        let form = LoginForm::parse(LOGIN, &ids).unwrap();
        assert_eq!(form.action, "./Default.aspx?ReturnUrl=%2f");
        assert_eq!(form.username_name, "ctl00$ContentPlaceHolder1$userid");
        assert_eq!(form.password_name, "ctl00$ContentPlaceHolder1$pw");
        assert_eq!(
            form.fields,
            vec![
                ("__VIEWSTATE".to_string(), "vs123".to_string()),
                ("__EVENTVALIDATION".to_string(), "ev456".to_string()),
            ]
        );

        let body = form.into_body("alice", "s3cret");
        assert_eq!(body.len(), 5);
        assert_eq!(
            body[2],
            ("ctl00$ContentPlaceHolder1$userid".to_string(), "alice".to_string())
        );
        assert_eq!(
            body[4],
            (
                "ctl00$ContentPlaceHolder1$default_auth_button".to_string(),
                "Log In".to_string()
            )
        );
    }

    #[test]
    fn missing_credential_fields_are_fatal() {
        let ids = LoginFieldIds::default();
        let err = LoginForm::parse("<form><input name='x'/></form>", &ids).unwrap_err();
        assert!(err.to_string().contains("login form"));

        let no_pw = r#"<form><input name="u" id="ctl00_ContentPlaceHolder1_userid"/></form>"#;
        let err = LoginForm::parse(no_pw, &ids).unwrap_err();
        assert!(err.to_string().contains("password field"));
    }

    const LANDING: &str = r#"<html><body>
        <a id="lnkStudySignupLink" href="all_exp_participant.aspx">View Available Studies</a>
        </body></html>"#;

    #[test]
    fn timeout_is_configurable() {
        let s = HttpSession::new().unwrap();
        assert_eq!(s.timeout, Duration::from_secs(30));
        assert_eq!(s.with_timeout(7).timeout, Duration::from_secs(7));
    }

    #[test]
    fn login_is_rejected_when_the_form_comes_back() {
        let ids = LoginFieldIds::default();
        assert!(login_rejected(LOGIN, &ids));
        assert!(!login_rejected(LANDING, &ids));
        // Neither link nor form: let navigation report the missing link.
        assert!(!login_rejected("<html><body>Welcome</body></html>", &ids));
    }

    #[test]
    fn listing_view_link_must_be_a_plain_href() {
        let ids = LoginFieldIds::default();
        assert_eq!(
            listing_view_href(LANDING, &ids).unwrap(),
            "all_exp_participant.aspx"
        );

        let postback = LANDING.replace(
            "all_exp_participant.aspx",
            "javascript:__doPostBack('lnkStudySignupLink','')",
        );
        let err = listing_view_href(&postback, &ids).unwrap_err();
        assert!(err.to_string().contains("script postback"));

        let err = listing_view_href(LOGIN, &ids).unwrap_err();
        assert!(err.to_string().contains("lnkStudySignupLink"));
    }
}
