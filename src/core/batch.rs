#![forbid(unsafe_code)]

use serde::Serialize;

use crate::error::BoardError;

/// Parses `"3"` or `"1,2,5"`. Duplicates collapse, order is kept.
pub fn parse_ids(raw: &str) -> Result<Vec<u32>, BoardError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim) {
        let id: u32 = part
            .trim_start_matches('#')
            .parse()
            .map_err(|_| BoardError::InvalidTaskId(part.to_owned()))?;
        if id == 0 {
            return Err(BoardError::InvalidTaskId(part.to_owned()));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[derive(Debug)]
pub struct BatchItem<T> {
    pub id: u32,
    pub result: Result<T, BoardError>,
}

/// Per-id outcomes of a batch. Each id commits or fails on its own.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub items: Vec<BatchItem<T>>,
}

#[derive(Debug, Serialize)]
struct ItemJson {
    id: u32,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl<T> BatchReport<T> {
    pub fn run(ids: &[u32], mut op: impl FnMut(u32) -> Result<T, BoardError>) -> Self {
        let items = ids
            .iter()
            .map(|&id| BatchItem { id, result: op(id) })
            .collect();
        Self { items }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// `"N/M <verb>"`.
    #[must_use]
    pub fn summary(&self, verb: &str) -> String {
        format!("{}/{} {verb}", self.succeeded(), self.total())
    }

    pub fn failures(&self) -> impl Iterator<Item = (u32, &BoardError)> {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().err().map(|e| (i.id, e)))
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let items: Vec<ItemJson> = self
            .items
            .iter()
            .map(|i| ItemJson {
                id: i.id,
                ok: i.result.is_ok(),
                error: i.result.as_ref().err().map(ToString::to_string),
                code: i.result.as_ref().err().map(BoardError::code),
            })
            .collect();
        serde_json::json!({
            "total": self.total(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "results": items,
        })
    }

    /// `BatchFailed` when any id failed.
    pub fn into_result(self) -> Result<Vec<T>, BoardError> {
        let (failed, total) = (self.failed(), self.total());
        if failed > 0 {
            return Err(BoardError::BatchFailed { failed, total });
        }
        Ok(self.items.into_iter().filter_map(|i| i.result.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lists_and_rejects_junk() {
        assert_eq!(parse_ids("3").unwrap(), [3]);
        assert_eq!(parse_ids("1, 2,#5,2").unwrap(), [1, 2, 5]);
        assert!(matches!(parse_ids("1,x"), Err(BoardError::InvalidTaskId(s)) if s == "x"));
        assert!(parse_ids("0").is_err());
        assert!(parse_ids("").is_err());
    }

    #[test]
    fn partial_failure_reports_counts() {
        let report = BatchReport::run(&[1, 2], |id| {
            if id == 2 {
                Err(BoardError::TaskNotFound(id))
            } else {
                Ok(id)
            }
        });
        assert_eq!(report.summary("archived"), "1/2 archived");
        let failures: Vec<u32> = report.failures().map(|(id, _)| id).collect();
        assert_eq!(failures, [2]);
        assert_eq!(report.to_json()["results"][1]["code"], "TASK_NOT_FOUND");
        assert!(matches!(
            report.into_result(),
            Err(BoardError::BatchFailed { failed: 1, total: 2 })
        ));
    }

    #[test]
    fn full_success_yields_values() {
        let report = BatchReport::run(&[4, 5], Ok);
        assert_eq!(report.into_result().unwrap(), [4, 5]);
    }
}
