//! DynamoDB table source.
//!
//! Full-table `Scan` pages are converted from the SDK's `AttributeValue`
//! into [`AttrValue`]. The cursor carries `LastEvaluatedKey` verbatim and is
//! passed back as `ExclusiveStartKey`.

use std::collections::HashMap;
use std::str::FromStr;

use analitica_core::{
    AttrValue, Item, ScanCursor, ScanPage, SourceError, SourceResult,
    TableSource,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use bigdecimal::BigDecimal;
use tracing::debug;

pub struct DynamoDbSource {
    client: Client,
}

impl DynamoDbSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(conf: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(conf))
    }
}

#[async_trait]
impl TableSource for DynamoDbSource {
    fn kind(&self) -> &'static str {
        "dynamodb"
    }

    async fn scan_page(
        &self,
        table: &str,
        cursor: Option<ScanCursor>,
    ) -> SourceResult<ScanPage> {
        let start_key = cursor.map(|c| item_to_key(c.into_key()));

        let out = self
            .client
            .scan()
            .table_name(table)
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| map_scan_error(table, e))?;

        let items = out
            .items()
            .iter()
            .map(from_dynamo_item)
            .collect::<SourceResult<Vec<_>>>()?;

        let next_cursor = out
            .last_evaluated_key()
            .filter(|k| !k.is_empty())
            .map(from_dynamo_item)
            .transpose()?
            .map(ScanCursor::new);

        debug!(
            table,
            returned = items.len(),
            more = next_cursor.is_some(),
            "dynamodb scan page"
        );
        Ok(ScanPage { items, next_cursor })
    }
}

fn map_scan_error(table: &str, err: SdkError<ScanError>) -> SourceError {
    let details = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(ctx) => {
            let e = ctx.err();
            if e.is_resource_not_found_exception() {
                SourceError::TableNotFound {
                    table: table.to_owned(),
                }
            } else if e.is_provisioned_throughput_exceeded_exception()
                || e.is_request_limit_exceeded()
            {
                SourceError::Throttled {
                    details: details.into(),
                }
            } else if details.contains("AccessDenied") {
                SourceError::Permission {
                    details: details.into(),
                }
            } else {
                SourceError::Other(anyhow::anyhow!(details))
            }
        }
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            SourceError::Connect {
                details: details.into(),
            }
        }
        _ => SourceError::Other(anyhow::anyhow!(details)),
    }
}

// ============================================================================
// AttributeValue conversion
// ============================================================================

fn from_dynamo_item(
    raw: &HashMap<String, AttributeValue>,
) -> SourceResult<Item> {
    raw.iter()
        .map(|(k, v)| Ok((k.clone(), from_dynamo(v)?)))
        .collect()
}

fn from_dynamo(value: &AttributeValue) -> SourceResult<AttrValue> {
    let v = match value {
        AttributeValue::S(s) => AttrValue::String(s.clone()),
        AttributeValue::N(n) => AttrValue::Number(decimal(n)?),
        AttributeValue::B(b) => AttrValue::Binary(b.as_ref().to_vec()),
        AttributeValue::Bool(b) => AttrValue::Bool(*b),
        AttributeValue::Null(_) => AttrValue::Null,
        AttributeValue::L(list) => AttrValue::List(
            list.iter().map(from_dynamo).collect::<SourceResult<_>>()?,
        ),
        AttributeValue::M(map) => AttrValue::Map(from_dynamo_item(map)?),
        AttributeValue::Ss(set) => AttrValue::StringSet(set.clone()),
        AttributeValue::Ns(set) => AttrValue::NumberSet(
            set.iter()
                .map(|n| decimal(n))
                .collect::<SourceResult<_>>()?,
        ),
        AttributeValue::Bs(set) => AttrValue::BinarySet(
            set.iter().map(|b| b.as_ref().to_vec()).collect(),
        ),
        other => {
            return Err(SourceError::Decode {
                details: format!("unsupported attribute value: {other:?}")
                    .into(),
            });
        }
    };
    Ok(v)
}

fn decimal(raw: &str) -> SourceResult<BigDecimal> {
    BigDecimal::from_str(raw).map_err(|e| SourceError::Decode {
        details: format!("invalid number {raw:?}: {e}").into(),
    })
}

fn item_to_key(item: Item) -> HashMap<String, AttributeValue> {
    item.into_iter().map(|(k, v)| (k, to_dynamo(v))).collect()
}

fn to_dynamo(value: AttrValue) -> AttributeValue {
    match value {
        AttrValue::String(s) => AttributeValue::S(s),
        AttrValue::Number(n) => AttributeValue::N(n.to_string()),
        AttrValue::Binary(b) => AttributeValue::B(Blob::new(b)),
        AttrValue::Bool(b) => AttributeValue::Bool(b),
        AttrValue::Null => AttributeValue::Null(true),
        AttrValue::List(l) => {
            AttributeValue::L(l.into_iter().map(to_dynamo).collect())
        }
        AttrValue::Map(m) => AttributeValue::M(item_to_key(m)),
        AttrValue::StringSet(s) => AttributeValue::Ss(s),
        AttrValue::NumberSet(s) => {
            AttributeValue::Ns(s.iter().map(ToString::to_string).collect())
        }
        AttrValue::BinarySet(s) => {
            AttributeValue::Bs(s.into_iter().map(Blob::new).collect())
        }
    }
}
