use {
    crate::{
        client::Client,
        crypto::derive_key_set,
        error::{Error, Result},
    },
    snsync_protocol::{
        credentials::{generate_pw_nonce, Session},
        endpoints::{
            RegisterRequest, SignInRequest, SignInResponse, AUTH_PARAMS_PATH, REGISTER_PATH,
            SIGN_IN_PATH,
        },
        AuthParams, ErrorBody, DEFAULT_PW_COST, DEFAULT_SERVER, PROTOCOL_VERSION,
    },
    std::fmt::{self, Debug},
    tracing::{debug, instrument},
};

/// Credentials for [`Client::sign_in`]. An empty `api_server` means the
/// default server. The MFA fields are filled on the second attempt, after
/// the server has announced the field name it wants the token under.
#[derive(Clone, Default)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
    pub api_server: String,
    pub mfa_token_name: Option<String>,
    pub mfa_token_value: Option<String>,
}

impl Debug for SignInInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInInput")
            .field("email", &self.email)
            .field("api_server", &self.api_server)
            .finish_non_exhaustive()
    }
}

/// Outcome of a sign-in attempt.
///
/// When the server challenged for MFA and no token was supplied,
/// `token_name` names the field to prompt for, the session is unusable,
/// and no password was sent.
#[derive(Debug, Default)]
pub struct SignInOutput {
    pub session: Session,
    pub token_name: Option<String>,
}

/// Credentials for [`Client::register`]. An empty `api_server` means the
/// default server.
#[derive(Clone, Default)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub api_server: String,
}

impl Debug for RegisterInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterInput")
            .field("email", &self.email)
            .field("api_server", &self.api_server)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Signs in with email, password and an optional MFA token.
    ///
    /// Two steps: fetch the account's key-derivation parameters, then
    /// exchange the derived `pw` for a bearer token. The password itself
    /// never leaves the process.
    #[instrument(skip_all, fields(email = %input.email))]
    pub fn sign_in(&self, input: SignInInput) -> Result<SignInOutput> {
        let server = effective_server(&input.api_server);
        let mfa = input
            .mfa_token_name
            .as_deref()
            .zip(input.mfa_token_value.as_deref());
        let (params, challenge) = self.auth_params(server, &input.email, mfa)?;

        if let Some(token_name) = challenge {
            if mfa.is_some() {
                // the supplied token did not satisfy the server
                return Err(Error::MfaRequired(token_name));
            }
            debug!(%token_name, "server requested a multi-factor token");
            return Ok(SignInOutput {
                session: Session::default(),
                token_name: Some(token_name),
            });
        }

        // the account's own identifier wins over whatever the server echoed
        let params = AuthParams {
            identifier: input.email.clone(),
            ..params
        };
        let keys = derive_key_set(&input.password, &params)?;

        let mut request = SignInRequest::new(&input.email, keys.pw());
        if let Some((name, value)) = mfa {
            request = request.with_mfa(name, value);
        }
        let response = self.post(
            format!("{server}{SIGN_IN_PATH}"),
            None,
            serde_json::to_string(&request)?,
        )?;

        let error_body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
        if !error_body.error.message.is_empty() {
            return Err(Error::BadCredentials(error_body.error.message.to_lowercase()));
        }
        let success: SignInResponse = serde_json::from_slice(&response.body)?;
        debug!(user = %success.user.uuid, "signed in");

        Ok(SignInOutput {
            session: Session {
                server: server.to_owned(),
                token: success.token,
                mk: keys.mk().to_owned(),
                ak: keys.ak().to_owned(),
            },
            token_name: input.mfa_token_name.clone(),
        })
    }

    /// Registers a new account and returns the server's bearer token.
    ///
    /// Generates a fresh `pw_nonce`, derives `pw` with the default cost
    /// and version, and posts the registration. Keys for the new account
    /// come from a subsequent [`Client::sign_in`].
    #[instrument(skip_all, fields(email = %input.email))]
    pub fn register(&self, input: RegisterInput) -> Result<String> {
        let server = effective_server(&input.api_server);
        let pw_nonce = generate_pw_nonce();
        let params = AuthParams {
            identifier: input.email.clone(),
            pw_salt: String::new(),
            pw_cost: DEFAULT_PW_COST,
            pw_nonce: pw_nonce.clone(),
            version: PROTOCOL_VERSION.to_owned(),
        };
        let keys = derive_key_set(&input.password, &params)?;

        let request = RegisterRequest {
            email: input.email.clone(),
            identifier: input.email.clone(),
            password: keys.pw().to_owned(),
            pw_cost: DEFAULT_PW_COST.to_string(),
            pw_nonce,
            version: PROTOCOL_VERSION.to_owned(),
        };
        let response = self.post(
            format!("{server}{REGISTER_PATH}"),
            None,
            serde_json::to_string(&request)?,
        )?;
        match response.status {
            200 => {
                let body: SignInResponse = serde_json::from_slice(&response.body)?;
                Ok(body.token)
            }
            401 => Err(Error::EmailAlreadyRegistered),
            404 => Err(Error::EmailNotRecognised),
            code => Err(Error::UnhandledStatus(code)),
        }
    }

    /// Fetches auth-params for an account. Returns the params and, when
    /// the server answered with an MFA challenge instead, the field name
    /// the token must be posted under.
    fn auth_params(
        &self,
        server: &str,
        email: &str,
        mfa: Option<(&str, &str)>,
    ) -> Result<(AuthParams, Option<String>)> {
        let url = match mfa {
            Some((name, value)) => {
                format!("{server}{AUTH_PARAMS_PATH}?email={email}&{name}={value}")
            }
            None => format!("{server}{AUTH_PARAMS_PATH}?email={email}"),
        };
        let response = self.get(url)?;
        match response.status {
            200 => Ok((serde_json::from_slice(&response.body)?, None)),
            401 => {
                let body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
                if body.error.payload.mfa_key.is_empty() {
                    Err(Error::BadCredentials(body.error.message.to_lowercase()))
                } else {
                    Ok((AuthParams::default(), Some(body.error.payload.mfa_key)))
                }
            }
            // email address not recognised; indistinguishable from a fresh
            // account on purpose
            404 => Ok((AuthParams::default(), None)),
            code => Err(Error::UnhandledStatus(code)),
        }
    }
}

fn effective_server(api_server: &str) -> &str {
    if api_server.is_empty() {
        DEFAULT_SERVER
    } else {
        api_server
    }
}
