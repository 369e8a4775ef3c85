use crate::errors::{CellMdError, Result};

pub trait ArgsExt {
    fn get_required(&self, index: usize, line: usize) -> Result<&str>;
    fn parse_int_at(&self, index: usize, line: usize) -> Result<i64>;
    fn parse_float_at(&self, index: usize, line: usize) -> Result<f64>;
    fn parse_usize_at(&self, index: usize, line: usize) -> Result<usize>;
    fn parse_flag_at(&self, index: usize, line: usize) -> Result<bool>;
}

impl ArgsExt for [&str] {
    fn get_required(&self, index: usize, line: usize) -> Result<&str> {
        self.get(index)
            .copied()
            .ok_or(CellMdError::MissingArgument { line })
    }

    fn parse_int_at(&self, index: usize, line: usize) -> Result<i64> {
        let arg = self.get_required(index, line)?;
        arg.parse().map_err(|e| CellMdError::IntParseError {
            string: arg.to_string(),
            source: e,
        })
    }

    fn parse_float_at(&self, index: usize, line: usize) -> Result<f64> {
        let arg = self.get_required(index, line)?;
        arg.parse().map_err(|e| CellMdError::FloatParseError {
            string: arg.to_string(),
            source: e,
        })
    }

    fn parse_usize_at(&self, index: usize, line: usize) -> Result<usize> {
        self.parse_int_at(index, line)?.convert_to_usize(line)
    }

    /// `1`/`0`, `yes`/`no` or `true`/`false`.
    fn parse_flag_at(&self, index: usize, line: usize) -> Result<bool> {
        match self.get_required(index, line)? {
            "1" | "yes" | "true" => Ok(true),
            "0" | "no" | "false" => Ok(false),
            other => Err(CellMdError::InvalidArgument {
                string: other.to_string(),
                line,
            }),
        }
    }
}

pub trait Int64ToUsize {
    fn convert_to_usize(&self, line: usize) -> Result<usize>;
}

impl Int64ToUsize for i64 {
    fn convert_to_usize(&self, line: usize) -> Result<usize> {
        (*self)
            .try_into()
            .map_err(|_| CellMdError::NegativeValue { value: *self, line })
    }
}
