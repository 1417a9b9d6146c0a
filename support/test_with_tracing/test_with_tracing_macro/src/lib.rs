// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The attribute macro behind `test_with_tracing::test`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse_macro_input;
use syn::spanned::Spanned;
use syn::Error;
use syn::ItemFn;

/// Like `#[test]`, but installs the `tracing` test subscriber before the
/// body runs.
#[proc_macro_attribute]
pub fn test(
    attr: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let attr = TokenStream::from(attr);
    let item = parse_macro_input!(item as ItemFn);
    expand(attr, item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand(attr: TokenStream, item: ItemFn) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return Err(Error::new(attr.span(), "no arguments expected"));
    }
    let sig = &item.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(Error::new(asyncness.span(), "async tests are not supported"));
    }
    if !sig.inputs.is_empty() {
        return Err(Error::new(sig.inputs.span(), "tests take no arguments"));
    }

    let name = &sig.ident;
    let output = &sig.output;
    let attrs = &item.attrs;
    let vis = &item.vis;
    let body = &item.block;

    // The outer #[test] comes first so that attributes such as
    // #[should_panic] still apply to the test function.
    Ok(quote! {
        #[::core::prelude::v1::test]
        #(#attrs)*
        #vis fn #name() #output {
            ::test_with_tracing::init();
            #body
        }
    })
}
