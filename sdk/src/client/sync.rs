use {
    crate::{
        client::Client,
        error::{Error, Result},
        items::{dedupe_encrypted_items, encrypt_items, validate_items, Item},
    },
    snsync_protocol::{
        credentials::Session,
        endpoints::{SyncRequest, SyncResponse, SYNC_PATH},
        util::strip_line_break,
        EncryptedItem, PAGE_SIZE,
    },
    tracing::{debug, instrument},
};

/// Oversized-response retries per retrieval.
const MAX_GET_ATTEMPTS: usize = 3;
/// Attempts per sub-chunk window run during submission.
const MAX_PUT_ATTEMPTS: usize = 20;
/// Retrieval limit multiplier after an oversized response.
const RETRY_SCALE_FACTOR: f64 = 0.25;
/// Submission bodies above this many bytes shrink by half instead of 10%.
const AGGRESSIVE_SHRINK_BYTES: usize = 2_000_000;

/// Input for [`Client::get_items`].
#[derive(Debug, Clone, Default)]
pub struct GetItemsInput {
    pub session: Session,
    pub sync_token: String,
    pub cursor_token: String,
    /// When non-zero, return after a single call requesting this many
    /// items and let the caller drive pagination through `cursor`.
    pub batch_size: usize,
    /// Items requested per sync call; zero means [`PAGE_SIZE`].
    pub page_size: usize,
}

/// Accumulated output of a retrieval.
#[derive(Debug, Clone, Default)]
pub struct GetItemsOutput {
    /// Items new or modified since the last sync.
    pub retrieved_items: Vec<EncryptedItem>,
    /// Dirty items needing resolution.
    pub saved_items: Vec<EncryptedItem>,
    /// Items not saved during sync.
    pub unsaved: Vec<EncryptedItem>,
    pub sync_token: String,
    /// Empty unless the caller paginates with `batch_size`.
    pub cursor: String,
}

/// Input for [`Client::put_items`]. Items are validated and encrypted
/// before anything is sent.
#[derive(Debug, Clone, Default)]
pub struct PutItemsInput {
    pub session: Session,
    pub items: Vec<Item>,
    pub sync_token: String,
}

#[derive(Debug, Clone, Default)]
pub struct PutItemsOutput {
    pub saved_items: Vec<EncryptedItem>,
    /// Token returned by the last accepted sub-chunk; use it for the next
    /// call on this session.
    pub sync_token: String,
}

impl Client {
    /// Retrieves items, following cursor continuations until the server
    /// is drained (or for exactly one call in `batch_size` mode).
    ///
    /// An oversized response shrinks the per-call limit to a quarter and
    /// retries, a few times at most. Each returned array is de-duplicated
    /// by uuid, first occurrence wins.
    #[instrument(skip_all)]
    pub fn get_items(&self, input: GetItemsInput) -> Result<GetItemsOutput> {
        let mut input = input;
        let mut attempt = 0;
        let mut output = loop {
            attempt += 1;
            match self.get_items_via_api(&input) {
                Ok(output) => break output,
                Err(err) if err.is_payload_too_large() && attempt < MAX_GET_ATTEMPTS => {
                    let initial = effective_limit(&input);
                    resize_for_retry(&mut input);
                    debug!(
                        from = initial,
                        to = effective_limit(&input),
                        "failed to retrieve this many items at a time, reducing",
                    );
                }
                Err(err) => return Err(err),
            }
        };
        dedupe_encrypted_items(&mut output.retrieved_items);
        dedupe_encrypted_items(&mut output.saved_items);
        dedupe_encrypted_items(&mut output.unsaved);
        Ok(output)
    }

    fn get_items_via_api(&self, input: &GetItemsInput) -> Result<GetItemsOutput> {
        let limit = effective_limit(input);
        debug!(limit, "using limit");

        let mut sync_token = input.sync_token.clone();
        let mut cursor = input.cursor_token.clone();
        let mut output = GetItemsOutput::default();
        loop {
            let request = match cursor.as_str() {
                "" => SyncRequest::first_page(limit),
                "null" => SyncRequest::next_page(limit, &sync_token, None),
                concrete => SyncRequest::next_page(limit, &sync_token, Some(concrete)),
            };
            let response = self.sync_call(&input.session, serde_json::to_string(&request)?)?;

            output.retrieved_items.extend(response.retrieved_items);
            output.saved_items.extend(response.saved_items);
            output.unsaved.extend(response.unsaved);
            sync_token = strip_line_break(&response.sync_token).to_owned();
            cursor = strip_line_break(response.cursor_token.as_deref().unwrap_or_default())
                .to_owned();

            if input.batch_size > 0 {
                // the caller paginates
                output.sync_token = sync_token;
                output.cursor = cursor;
                return Ok(output);
            }
            if cursor.is_empty() || cursor == "null" {
                break;
            }
        }
        output.sync_token = sync_token;
        output.cursor = String::new();
        Ok(output)
    }

    /// Validates, encrypts and submits items.
    ///
    /// Items go up in big chunks of [`PAGE_SIZE`]; within a big chunk a
    /// `[sub_start, sub_end]` window shrinks geometrically whenever the
    /// server rejects the body as too large (by half above
    /// 2 MB, by 10% otherwise), and advances after each accepted
    /// sub-chunk. A window run that exhausts its attempt budget fails the
    /// whole put.
    #[instrument(skip_all, fields(items = input.items.len()))]
    pub fn put_items(&self, input: PutItemsInput) -> Result<PutItemsOutput> {
        validate_items(&input.items)?;
        let encrypted = encrypt_items(&input.items, &input.session.mk, &input.session.ak)?;

        let mut sync_token = strip_line_break(&input.sync_token).to_owned();
        let mut saved_items = Vec::new();

        let mut big_start = 0;
        while big_start < encrypted.len() {
            let big_end = (big_start + PAGE_SIZE).min(encrypted.len()) - 1;
            debug!(from = big_start + 1, to = big_end + 1, "putting items");

            let mut sub_start = big_start;
            let mut sub_end = big_end;
            let mut attempt = 0;
            loop {
                let window = &encrypted[sub_start..=sub_end];
                let request = SyncRequest::submit(window.to_vec(), &sync_token);
                let body = serde_json::to_string(&request)?;
                let body_len = body.len();
                attempt += 1;
                debug!(attempt, max = MAX_PUT_ATTEMPTS, window = window.len(), "attempt");

                match self.sync_call(&input.session, body) {
                    Ok(response) => {
                        sync_token = strip_line_break(&response.sync_token).to_owned();
                        saved_items.extend(response.saved_items);
                        if sub_end == big_end {
                            break;
                        }
                        sub_start = sub_end + 1;
                        sub_end = big_end;
                        attempt = 0;
                    }
                    Err(err) if err.is_payload_too_large() => {
                        if attempt >= MAX_PUT_ATTEMPTS {
                            return Err(Error::PartialPutFailure);
                        }
                        // the forced-movement rule can overshoot on the
                        // last item of a chunk
                        let shrunk = resize_put_for_retry(sub_start, sub_end, body_len).min(big_end);
                        debug!(
                            bytes = body_len,
                            from = sub_end,
                            to = shrunk,
                            "request too large, shrinking sub-chunk",
                        );
                        sub_end = shrunk;
                    }
                    Err(err) => return Err(err),
                }
            }
            big_start = big_end + 1;
        }

        Ok(PutItemsOutput {
            saved_items,
            sync_token,
        })
    }

    fn sync_call(&self, session: &Session, body: String) -> Result<SyncResponse> {
        let bytes = body.len();
        let response = self.post(
            format!("{}{SYNC_PATH}", session.server),
            Some(session.token.clone()),
            body,
        )?;
        match response.status {
            413 => {
                debug!(bytes, status = 413, "sync request rejected as too large");
                Err(Error::RequestEntityTooLarge)
            }
            status if (200..300).contains(&status) => {
                debug!(bytes, status, "sync request succeeded");
                Ok(serde_json::from_slice(&response.body)?)
            }
            status => {
                debug!(bytes, status, "sync request failed");
                Err(Error::UnhandledStatus(status))
            }
        }
    }
}

fn effective_limit(input: &GetItemsInput) -> usize {
    if input.batch_size > 0 {
        input.batch_size
    } else if input.page_size > 0 {
        input.page_size
    } else {
        PAGE_SIZE
    }
}

fn resize_for_retry(input: &mut GetItemsInput) {
    if input.batch_size != 0 {
        input.batch_size = scaled_down(input.batch_size);
    } else if input.page_size != 0 {
        input.page_size = scaled_down(input.page_size);
    } else {
        input.page_size = scaled_down(PAGE_SIZE);
    }
}

fn scaled_down(size: usize) -> usize {
    (size as f64 * RETRY_SCALE_FACTOR).ceil() as usize
}

/// New `sub_end` after an oversized submission. Shrinks by half when the
/// failing body exceeded the aggressive threshold, by 10% otherwise;
/// keeps the window ahead of `start` and guarantees movement.
fn resize_put_for_retry(start: usize, end: usize, body_len: usize) -> usize {
    let pre_shrink = end;
    let multiplier = if body_len > AGGRESSIVE_SHRINK_BYTES {
        0.50
    } else {
        0.90
    };
    let mut end = (end as f64 * multiplier).ceil() as usize;
    if end <= start {
        end = start + 1;
    }
    if pre_shrink == end && pre_shrink > 1 {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::client::testing::{json_response, StubTransport},
        serde_json::json,
        std::sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    fn session() -> Session {
        Session {
            server: "https://notes.test".into(),
            token: "bearer-token".into(),
            mk: "a".repeat(64),
            ak: "b".repeat(64),
        }
    }

    fn envelopes(prefix: &str, count: usize) -> Vec<serde_json::Value> {
        (0..count)
            .map(|n| {
                json!({
                    "uuid": format!("{prefix}-{n}"),
                    "content": "",
                    "content_type": "Note",
                    "enc_item_key": "",
                    "deleted": false,
                    "created_at": "2016-12-16T17:37:50.000Z",
                    "updated_at": "2016-12-16T17:37:50.000Z",
                })
            })
            .collect()
    }

    fn page(items: Vec<serde_json::Value>, sync_token: &str, cursor: serde_json::Value) -> String {
        json!({
            "retrieved_items": items,
            "saved_items": [],
            "unsaved": [],
            "sync_token": sync_token,
            "cursor_token": cursor,
        })
        .to_string()
    }

    #[test]
    fn paginated_get_accumulates_until_cursor_runs_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stub_calls = calls.clone();
        let transport = Arc::new(StubTransport::new(move |request| {
            assert!(request.url.ends_with("/items/sync"));
            assert_eq!(request.bearer.as_deref(), Some("bearer-token"));
            let call = stub_calls.fetch_add(1, Ordering::SeqCst);
            match call {
                0 => {
                    assert_eq!(request.body.as_deref(), Some(r#"{"limit":110}"#));
                    Ok(json_response(
                        200,
                        &page(envelopes("first", 50), "st1\n", json!("abc\n")),
                    ))
                }
                1 => {
                    assert_eq!(
                        request.body.as_deref(),
                        Some(r#"{"limit":110,"items":[],"sync_token":"st1\n","cursor_token":"abc\n"}"#),
                    );
                    Ok(json_response(
                        200,
                        &page(envelopes("second", 30), "st2\n", json!("")),
                    ))
                }
                other => panic!("unexpected call #{other}"),
            }
        }));
        let client = Client::with_transport(transport);
        let output = client
            .get_items(GetItemsInput {
                session: session(),
                ..GetItemsInput::default()
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(output.retrieved_items.len(), 80);
        assert_eq!(output.retrieved_items[0].uuid, "first-0");
        assert_eq!(output.retrieved_items[79].uuid, "second-29");
        assert_eq!(output.sync_token, "st2");
        assert_eq!(output.cursor, "");
    }

    #[test]
    fn batch_size_returns_after_one_call() {
        let transport = Arc::new(StubTransport::new(|request| {
            assert_eq!(request.body.as_deref(), Some(r#"{"limit":50}"#));
            Ok(json_response(
                200,
                &page(envelopes("only", 50), "st1\n", json!("abc\n")),
            ))
        }));
        let client = Client::with_transport(transport.clone());
        let output = client
            .get_items(GetItemsInput {
                session: session(),
                batch_size: 50,
                ..GetItemsInput::default()
            })
            .unwrap();

        assert_eq!(transport.requests.lock().unwrap().len(), 1);
        assert_eq!(output.retrieved_items.len(), 50);
        assert_eq!(output.sync_token, "st1");
        assert_eq!(output.cursor, "abc");
    }

    #[test]
    fn null_cursor_continuation_body() {
        let transport = Arc::new(StubTransport::new(|request| {
            assert_eq!(
                request.body.as_deref(),
                Some(r#"{"limit":110,"items":[],"sync_token":"st1\n","cursor_token":null}"#),
            );
            Ok(json_response(200, &page(envelopes("a", 1), "st2\n", json!(""))))
        }));
        let client = Client::with_transport(transport.clone());
        let output = client
            .get_items(GetItemsInput {
                session: session(),
                cursor_token: "null".into(),
                sync_token: "st1".into(),
                ..GetItemsInput::default()
            })
            .unwrap();
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
        assert_eq!(output.retrieved_items.len(), 1);
        assert_eq!(output.sync_token, "st2");
    }

    #[test]
    fn oversized_get_shrinks_the_limit() {
        let transport = Arc::new(StubTransport::new(|request| {
            let body: serde_json::Value =
                serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
            if body["limit"].as_u64().unwrap() > 28 {
                Ok(json_response(413, ""))
            } else {
                Ok(json_response(200, &page(envelopes("x", 5), "st\n", json!(""))))
            }
        }));
        let client = Client::with_transport(transport.clone());
        let output = client
            .get_items(GetItemsInput {
                session: session(),
                ..GetItemsInput::default()
            })
            .unwrap();
        assert_eq!(output.retrieved_items.len(), 5);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].body.as_deref().unwrap().contains("\"limit\":110"));
        assert!(requests[1].body.as_deref().unwrap().contains("\"limit\":28"));
    }

    #[test]
    fn oversized_get_gives_up_after_three_attempts() {
        let transport = Arc::new(StubTransport::new(|_| Ok(json_response(413, ""))));
        let client = Client::with_transport(transport.clone());
        let err = client
            .get_items(GetItemsInput {
                session: session(),
                ..GetItemsInput::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::RequestEntityTooLarge));
        assert_eq!(transport.requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn retrieved_duplicates_are_dropped_first_wins() {
        let transport = Arc::new(StubTransport::new(|_| {
            let mut items = envelopes("dup", 2);
            items.push(items[0].clone());
            Ok(json_response(200, &page(items, "st\n", json!(""))))
        }));
        let client = Client::with_transport(transport);
        let output = client
            .get_items(GetItemsInput {
                session: session(),
                ..GetItemsInput::default()
            })
            .unwrap();
        let uuids: Vec<&str> = output
            .retrieved_items
            .iter()
            .map(|i| i.uuid.as_str())
            .collect();
        assert_eq!(uuids, ["dup-0", "dup-1"]);
    }

    fn big_note(n: usize) -> Item {
        let mut item = Item::new_note();
        if let Some(content) = &mut item.content {
            content.set_title(format!("note {n}"));
            content.set_text("x".repeat(60 * 1024));
        }
        item
    }

    #[test]
    fn oversized_put_shrinks_window_until_everything_is_saved() {
        let transport = Arc::new(StubTransport::new(|request| {
            let body: serde_json::Value =
                serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
            let items = body["items"].as_array().unwrap();
            if items.len() > 8 {
                return Ok(json_response(413, ""));
            }
            let response = json!({
                "retrieved_items": [],
                "saved_items": items,
                "unsaved": [],
                "sync_token": "put-token\n",
                "cursor_token": null,
            });
            Ok(json_response(200, &response.to_string()))
        }));
        let client = Client::with_transport(transport.clone());

        let items: Vec<Item> = (0..100).map(big_note).collect();
        let uuids: Vec<String> = items.iter().map(|i| i.uuid.clone()).collect();
        let output = client
            .put_items(PutItemsInput {
                session: session(),
                items,
                sync_token: String::new(),
            })
            .unwrap();

        assert_eq!(output.saved_items.len(), 100);
        let saved: Vec<&str> = output.saved_items.iter().map(|i| i.uuid.as_str()).collect();
        assert_eq!(saved, uuids);
        assert_eq!(output.sync_token, "put-token");

        // within each run the window only shrinks or holds until a
        // sub-chunk goes through, and nothing over the stub's limit was
        // ever accepted
        let requests = transport.requests.lock().unwrap();
        let mut previous: Option<usize> = None;
        for request in requests.iter() {
            let body: serde_json::Value =
                serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
            let window = body["items"].as_array().unwrap().len();
            if let Some(previous) = previous {
                assert!(window <= previous || previous <= 8);
            }
            previous = Some(window);
        }
    }

    #[test]
    fn put_gives_up_after_twenty_attempts_per_window() {
        let transport = Arc::new(StubTransport::new(|_| Ok(json_response(413, ""))));
        let client = Client::with_transport(transport.clone());
        let items: Vec<Item> = (0..5)
            .map(|n| {
                let mut item = Item::new_note();
                if let Some(content) = &mut item.content {
                    content.set_title(format!("note {n}"));
                }
                item
            })
            .collect();
        let err = client
            .put_items(PutItemsInput {
                session: session(),
                items,
                sync_token: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::PartialPutFailure));
        assert_eq!(transport.requests.lock().unwrap().len(), 20);
    }

    #[test]
    fn put_validates_before_sending() {
        let transport = Arc::new(StubTransport::new(|_| {
            panic!("nothing should reach the network")
        }));
        let client = Client::with_transport(transport);
        let err = client
            .put_items(PutItemsInput {
                session: session(),
                items: vec![Item::new_note()],
                sync_token: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidItem { .. }));
    }

    #[test]
    fn put_threads_the_sync_token_and_strips_newlines() {
        let transport = Arc::new(StubTransport::new(|request| {
            let body: serde_json::Value =
                serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
            assert_eq!(body["sync_token"], "incoming");
            let response = json!({
                "saved_items": body["items"],
                "sync_token": "outgoing\n",
            });
            Ok(json_response(200, &response.to_string()))
        }));
        let client = Client::with_transport(transport);
        let mut item = Item::new_note();
        if let Some(content) = &mut item.content {
            content.set_title("t");
        }
        let output = client
            .put_items(PutItemsInput {
                session: session(),
                items: vec![item],
                sync_token: "incoming\n".into(),
            })
            .unwrap();
        assert_eq!(output.sync_token, "outgoing");
    }

    #[test]
    fn non_size_errors_fail_the_put_immediately() {
        let transport = Arc::new(StubTransport::new(|_| Ok(json_response(500, ""))));
        let client = Client::with_transport(transport.clone());
        let mut item = Item::new_note();
        if let Some(content) = &mut item.content {
            content.set_title("t");
        }
        let err = client
            .put_items(PutItemsInput {
                session: session(),
                items: vec![item],
                sync_token: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnhandledStatus(500)));
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn shrink_arithmetic() {
        // gentle shrink, 10%
        assert_eq!(resize_put_for_retry(0, 99, 1_000), 90);
        // aggressive shrink above the byte threshold
        assert_eq!(resize_put_for_retry(0, 99, 3_000_000), 50);
        // never collapses onto the start
        assert_eq!(resize_put_for_retry(10, 10, 1_000), 11);
        // forced movement when rounding stalls
        assert_eq!(resize_put_for_retry(0, 9, 1_000), 8);
    }
}
