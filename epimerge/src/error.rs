//! Error types.

#[derive(thiserror::Error, Debug)]
pub enum EpimergeError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Source '{source_name}' is missing expected columns: {columns:?}")]
    MissingColumns { source_name: String, columns: Vec<String> },
    #[error("Source '{source_name}' maps a column onto unknown canonical field '{field}'")]
    UnknownField { source_name: String, field: String },
    #[error("Source '{source_name}' maps two columns onto canonical field '{field}'")]
    DuplicateField { source_name: String, field: String },
    #[error("Source '{source_name}' declares no date column")]
    NoDateColumn { source_name: String },
    #[error("Source '{source_name}' expects a table named '{table}' which was not supplied")]
    MissingTable { source_name: String, table: String },
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_anyhow() {
        let anyhow_error = anyhow!("An anyhow error");
        let epimerge_error: EpimergeError = anyhow_error.into();
        println!("{}", epimerge_error);
    }

    #[test]
    fn missing_columns_message_names_the_source() {
        let err = EpimergeError::MissingColumns {
            source_name: "pe_authority/confirmed".to_string(),
            columns: vec!["FECHA_RESULTADO".to_string()],
        };
        assert!(err.to_string().contains("pe_authority/confirmed"));
        assert!(err.to_string().contains("FECHA_RESULTADO"));
    }
}
