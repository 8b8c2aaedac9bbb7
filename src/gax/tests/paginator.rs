// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Verify the paginator works with list responses decoded from JSON, the way
//! generated clients use it.

use google_api_gax::error::Error;
use google_api_gax::paginator::{ItemPaginator, PageableResponse, Pager};
use serde::Deserialize;
use std::collections::HashMap;

type Result<T> = anyhow::Result<T>;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ListFoosResponse {
    items: Vec<Foo>,
    next_page_token: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct Foo {
    name: String,
}

impl PageableResponse for ListFoosResponse {
    type PageItem = Foo;

    fn next_page_token(&self) -> String {
        self.next_page_token.clone()
    }

    fn items(self) -> Vec<Foo> {
        self.items
    }
}

fn fake_service() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        (
            "",
            r#"{"items": [{"name": "f1"}, {"name": "f2"}], "nextPageToken": "abc"}"#,
        ),
        ("abc", r#"{"items": [{"name": "f3"}], "nextPageToken": "def"}"#),
        ("def", r#"{"items": [{"name": "f4"}]}"#),
    ])
}

fn list_foos(token: String) -> std::result::Result<ListFoosResponse, Error> {
    let pages = fake_service();
    let body = pages
        .get(token.as_str())
        .ok_or_else(|| Error::io(format!("unknown token {token}")))?;
    serde_json::from_str(body).map_err(Error::deser)
}

fn names(items: &[Foo]) -> Vec<&str> {
    items.iter().map(|f| f.name.as_str()).collect()
}

#[tokio::test]
async fn items() -> Result<()> {
    let mut paginator = ItemPaginator::new("", |_size, token| async move { list_foos(token) });
    let mut items = Vec::new();
    while let Some(item) = paginator.next().await {
        items.push(item?);
    }
    assert_eq!(names(&items), ["f1", "f2", "f3", "f4"]);
    Ok(())
}

#[tokio::test]
async fn pages_resume_from_saved_token() -> Result<()> {
    let mut paginator = ItemPaginator::new("", |_size, token| async move { list_foos(token) });
    let mut pager = Pager::new(&mut paginator, 2, "");
    let mut first = Vec::new();
    let saved = pager.next_page(&mut first).await?;
    assert_eq!(names(&first), ["f1", "f2"]);
    assert_eq!(saved, "abc");

    // A new paginator, e.g. in a different request handler, picks up at the
    // saved token.
    let mut paginator = ItemPaginator::new("", |_size, token| async move { list_foos(token) });
    let mut pager = Pager::new(&mut paginator, 2, saved);
    let mut second = Vec::new();
    let token = pager.next_page(&mut second).await?;
    assert_eq!(names(&second), ["f3", "f4"]);
    assert_eq!(token, "");
    Ok(())
}

#[tokio::test]
async fn error() -> Result<()> {
    let mut paginator =
        ItemPaginator::new("bad-token", |_size, token| async move { list_foos(token) });
    let err = paginator.next().await.and_then(|r| r.err());
    assert!(err.as_ref().is_some_and(Error::is_io), "{err:?}");
    // The paginator does not report a failed list as a finished list.
    let again = paginator.next().await.and_then(|r| r.err());
    assert!(again.as_ref().is_some_and(Error::is_io), "{again:?}");
    Ok(())
}

#[tokio::test]
async fn pages_error_is_terminal() -> Result<()> {
    let mut paginator = ItemPaginator::new("", |_size, token| async move { list_foos(token) });
    let mut pager = Pager::new(&mut paginator, 2, "bad-token");
    let mut items = Vec::new();
    for _ in 0..2 {
        let err = pager.next_page(&mut items).await.err();
        assert!(err.as_ref().is_some_and(Error::is_io), "{err:?}");
        assert!(items.is_empty(), "{items:?}");
    }
    Ok(())
}
