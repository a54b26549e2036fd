//! [`Engine`] implementation over the LightGBM C library.
//!
//! Each method is a thin `unsafe` shim: convert arguments to C types, call
//! the `LGBM_*` entry point, and map a non-zero status to [`ReturnCode`].
//! Arguments with no C representation (interior NULs, counts past
//! `i32::MAX`) are refused before the call. Pointers travel as [`RawHandle`]
//! integers.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::io;
use std::path::Path;

use lightgbm3_sys as sys;

use super::{CallError, CallResult, Engine, ImportanceType, PredictType, RawHandle, ReturnCode};
use crate::error::Error;

const DTYPE_FLOAT32: c_int = sys::C_API_DTYPE_FLOAT32 as c_int;
const DTYPE_FLOAT64: c_int = sys::C_API_DTYPE_FLOAT64 as c_int;

/// Engine backed by the linked LightGBM library.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

#[inline]
fn status(code: c_int) -> CallResult<()> {
    if code == 0 { Ok(()) } else { Err(ReturnCode(code).into()) }
}

#[inline]
fn ptr(handle: RawHandle) -> *mut c_void {
    handle.0 as *mut c_void
}

#[inline]
fn raw(pointer: *mut c_void) -> RawHandle {
    RawHandle(pointer as usize)
}

fn c_string(name: &str, s: &str) -> CallResult<CString> {
    CString::new(s).map_err(|_| {
        CallError::Rejected(Error::argument(name, s.escape_debug().to_string(), "interior NUL byte"))
    })
}

fn c_path(path: &Path) -> CallResult<CString> {
    CString::new(path.to_string_lossy().as_bytes()).map_err(|_| {
        CallError::Rejected(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path {} contains an interior NUL byte", path.display()),
        )))
    })
}

/// Checked conversion of a count or index to the engine's `int`.
fn c_count(name: &str, n: usize) -> CallResult<c_int> {
    c_int::try_from(n).map_err(|_| {
        CallError::Rejected(Error::argument(name, n.to_string(), "exceeds the engine's int range"))
    })
}

fn iteration_limit(num_iteration: Option<usize>) -> CallResult<c_int> {
    num_iteration.map_or(Ok(-1), |n| c_count("num_iteration", n))
}

impl Engine for NativeEngine {
    fn dataset_create_from_mat(
        &self,
        data: &[f64],
        n_rows: usize,
        n_cols: usize,
        params: &str,
        reference: Option<RawHandle>,
    ) -> CallResult<RawHandle> {
        let params = c_string("params", params)?;
        let n_rows = c_count("n_rows", n_rows)?;
        let n_cols = c_count("n_cols", n_cols)?;
        let reference = reference.map_or(std::ptr::null_mut(), ptr);
        let mut out: *mut c_void = std::ptr::null_mut();
        status(unsafe {
            sys::LGBM_DatasetCreateFromMat(
                data.as_ptr() as *const c_void,
                DTYPE_FLOAT64,
                n_rows,
                n_cols,
                1,
                params.as_ptr(),
                reference,
                &mut out,
            )
        })?;
        Ok(raw(out))
    }

    fn dataset_get_subset(
        &self,
        dataset: RawHandle,
        indices: &[i32],
        params: &str,
    ) -> CallResult<RawHandle> {
        let params = c_string("params", params)?;
        let n_indices = c_count("indices", indices.len())?;
        let mut out: *mut c_void = std::ptr::null_mut();
        status(unsafe {
            sys::LGBM_DatasetGetSubset(
                ptr(dataset),
                indices.as_ptr(),
                n_indices,
                params.as_ptr(),
                &mut out,
            )
        })?;
        Ok(raw(out))
    }

    fn dataset_set_field(&self, dataset: RawHandle, field: &str, data: &[f32]) -> CallResult<()> {
        let len = c_count(field, data.len())?;
        let field = c_string("field", field)?;
        status(unsafe {
            sys::LGBM_DatasetSetField(
                ptr(dataset),
                field.as_ptr(),
                data.as_ptr() as *const c_void,
                len,
                DTYPE_FLOAT32,
            )
        })
    }

    fn dataset_set_feature_names(&self, dataset: RawHandle, names: &[String]) -> CallResult<()> {
        let owned = names
            .iter()
            .map(|n| c_string("feature_name", n))
            .collect::<CallResult<Vec<_>>>()?;
        let mut pointers: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        let n_names = c_count("feature_names", pointers.len())?;
        status(unsafe {
            sys::LGBM_DatasetSetFeatureNames(
                ptr(dataset),
                pointers.as_mut_ptr(),
                n_names,
            )
        })
    }

    fn dataset_save_binary(&self, dataset: RawHandle, path: &Path) -> CallResult<()> {
        let path = c_path(path)?;
        status(unsafe { sys::LGBM_DatasetSaveBinary(ptr(dataset), path.as_ptr()) })
    }

    fn dataset_free(&self, dataset: RawHandle) -> CallResult<()> {
        status(unsafe { sys::LGBM_DatasetFree(ptr(dataset)) })
    }

    fn booster_create(&self, train: RawHandle, params: &str) -> CallResult<RawHandle> {
        let params = c_string("params", params)?;
        let mut out: *mut c_void = std::ptr::null_mut();
        status(unsafe { sys::LGBM_BoosterCreate(ptr(train), params.as_ptr(), &mut out) })?;
        Ok(raw(out))
    }

    fn booster_create_from_modelfile(&self, path: &Path) -> CallResult<(RawHandle, usize)> {
        let path = c_path(path)?;
        let mut iterations: c_int = 0;
        let mut out: *mut c_void = std::ptr::null_mut();
        status(unsafe {
            sys::LGBM_BoosterCreateFromModelfile(path.as_ptr(), &mut iterations, &mut out)
        })?;
        Ok((raw(out), iterations.max(0) as usize))
    }

    fn booster_free(&self, booster: RawHandle) -> CallResult<()> {
        status(unsafe { sys::LGBM_BoosterFree(ptr(booster)) })
    }

    fn booster_add_valid_data(&self, booster: RawHandle, dataset: RawHandle) -> CallResult<()> {
        status(unsafe { sys::LGBM_BoosterAddValidData(ptr(booster), ptr(dataset)) })
    }

    fn booster_update_one_iter(&self, booster: RawHandle) -> CallResult<bool> {
        let mut finished: c_int = 0;
        status(unsafe { sys::LGBM_BoosterUpdateOneIter(ptr(booster), &mut finished) })?;
        Ok(finished == 1)
    }

    fn booster_current_iteration(&self, booster: RawHandle) -> CallResult<usize> {
        let mut out: c_int = 0;
        status(unsafe { sys::LGBM_BoosterGetCurrentIteration(ptr(booster), &mut out) })?;
        Ok(out.max(0) as usize)
    }

    fn booster_num_classes(&self, booster: RawHandle) -> CallResult<usize> {
        let mut out: c_int = 0;
        status(unsafe { sys::LGBM_BoosterGetNumClasses(ptr(booster), &mut out) })?;
        Ok(out.max(1) as usize)
    }

    fn booster_num_feature(&self, booster: RawHandle) -> CallResult<usize> {
        let mut out: c_int = 0;
        status(unsafe { sys::LGBM_BoosterGetNumFeature(ptr(booster), &mut out) })?;
        Ok(out.max(0) as usize)
    }

    fn booster_eval_names(&self, booster: RawHandle) -> CallResult<Vec<String>> {
        let mut count: c_int = 0;
        status(unsafe { sys::LGBM_BoosterGetEvalCounts(ptr(booster), &mut count) })?;
        if count == 0 {
            return Ok(Vec::new());
        }

        // Two passes: the first call reports the longest name.
        let mut buffer_len: usize = 64;
        loop {
            let mut storage: Vec<Vec<u8>> = (0..count).map(|_| vec![0u8; buffer_len]).collect();
            let mut pointers: Vec<*mut c_char> = storage
                .iter_mut()
                .map(|s| s.as_mut_ptr() as *mut c_char)
                .collect();
            let mut out_len: c_int = 0;
            let mut required: usize = 0;
            status(unsafe {
                sys::LGBM_BoosterGetEvalNames(
                    ptr(booster),
                    count,
                    &mut out_len,
                    buffer_len,
                    &mut required,
                    pointers.as_mut_ptr(),
                )
            })?;
            if required > buffer_len {
                buffer_len = required;
                continue;
            }
            let names = storage
                .iter()
                .take(out_len.max(0) as usize)
                .map(|bytes| {
                    CStr::from_bytes_until_nul(bytes)
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default()
                })
                .collect();
            return Ok(names);
        }
    }

    fn booster_eval(&self, booster: RawHandle, data_idx: usize) -> CallResult<Vec<f64>> {
        let mut count: c_int = 0;
        status(unsafe { sys::LGBM_BoosterGetEvalCounts(ptr(booster), &mut count) })?;
        let data_idx = c_count("data_idx", data_idx)?;
        let mut values = vec![0.0f64; count.max(0) as usize];
        let mut out_len: c_int = 0;
        status(unsafe {
            sys::LGBM_BoosterGetEval(
                ptr(booster),
                data_idx,
                &mut out_len,
                values.as_mut_ptr(),
            )
        })?;
        values.truncate(out_len.max(0) as usize);
        Ok(values)
    }

    fn booster_predict_for_mat(
        &self,
        booster: RawHandle,
        data: &[f64],
        n_rows: usize,
        n_cols: usize,
        predict_type: PredictType,
        num_iteration: Option<usize>,
        params: &str,
    ) -> CallResult<Vec<f64>> {
        let params = c_string("params", params)?;
        let num_iteration = iteration_limit(num_iteration)?;
        let n_rows = c_count("n_rows", n_rows)?;
        let n_cols = c_count("n_cols", n_cols)?;

        let mut expected: i64 = 0;
        status(unsafe {
            sys::LGBM_BoosterCalcNumPredict(
                ptr(booster),
                n_rows,
                predict_type.code(),
                0,
                num_iteration,
                &mut expected,
            )
        })?;

        let mut out = vec![0.0f64; expected.max(0) as usize];
        let mut out_len: i64 = 0;
        status(unsafe {
            sys::LGBM_BoosterPredictForMat(
                ptr(booster),
                data.as_ptr() as *const c_void,
                DTYPE_FLOAT64,
                n_rows,
                n_cols,
                1,
                predict_type.code(),
                0,
                num_iteration,
                params.as_ptr(),
                &mut out_len,
                out.as_mut_ptr(),
            )
        })?;
        out.truncate(out_len.max(0) as usize);
        Ok(out)
    }

    fn booster_save_model(
        &self,
        booster: RawHandle,
        num_iteration: Option<usize>,
        path: &Path,
    ) -> CallResult<()> {
        let path = c_path(path)?;
        let num_iteration = iteration_limit(num_iteration)?;
        status(unsafe {
            sys::LGBM_BoosterSaveModel(
                ptr(booster),
                0,
                num_iteration,
                ImportanceType::Split.code(),
                path.as_ptr(),
            )
        })
    }

    fn booster_save_model_to_string(
        &self,
        booster: RawHandle,
        num_iteration: Option<usize>,
    ) -> CallResult<String> {
        let num_iteration = iteration_limit(num_iteration)?;
        let mut buffer = vec![0u8; 1 << 20];
        loop {
            let mut out_len: i64 = 0;
            status(unsafe {
                sys::LGBM_BoosterSaveModelToString(
                    ptr(booster),
                    0,
                    num_iteration,
                    ImportanceType::Split.code(),
                    buffer.len() as i64,
                    &mut out_len,
                    buffer.as_mut_ptr() as *mut c_char,
                )
            })?;
            let needed = out_len.max(0) as usize;
            if needed > buffer.len() {
                buffer.resize(needed, 0);
                continue;
            }
            // `out_len` counts the trailing NUL.
            buffer.truncate(needed.saturating_sub(1));
            return Ok(String::from_utf8_lossy(&buffer).into_owned());
        }
    }

    fn booster_feature_importance(
        &self,
        booster: RawHandle,
        num_iteration: Option<usize>,
        importance_type: ImportanceType,
    ) -> CallResult<Vec<f64>> {
        let num_iteration = iteration_limit(num_iteration)?;
        let n_features = self.booster_num_feature(booster)?;
        let mut out = vec![0.0f64; n_features];
        status(unsafe {
            sys::LGBM_BoosterFeatureImportance(
                ptr(booster),
                num_iteration,
                importance_type.code(),
                out.as_mut_ptr(),
            )
        })?;
        Ok(out)
    }

    fn last_error(&self) -> String {
        unsafe {
            let message = sys::LGBM_GetLastError();
            if message.is_null() {
                String::new()
            } else {
                CStr::from_ptr(message).to_string_lossy().into_owned()
            }
        }
    }
}
