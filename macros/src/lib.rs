use proc_macro::TokenStream;
use quote::quote;
use syn::{
  parse::Parser, parse_macro_input, punctuated::Punctuated, spanned::Spanned, Expr, ExprLit,
  ItemFn, Lit, Meta, ReturnType, Token,
};

/// Test attribute for rxsingle suites.
///
/// - `#[rxsingle_macro::test]` on a sync fn expands to `#[test]`.
/// - `#[rxsingle_macro::test(local)]` / `(shared)` on an async fn expands to a
///   current-thread / multi-thread `#[tokio::test]`.
/// - `repeat = N` runs the body `N` times inside one test, which is how the
///   race suites hammer a coordinator with concurrent completions.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let input = parse_macro_input!(item as ItemFn);
  let args = match Punctuated::<Meta, Token![,]>::parse_terminated.parse(attr) {
    Ok(args) => args,
    Err(err) => return err.to_compile_error().into(),
  };

  let is_async = input.sig.asyncness.is_some();
  let mut flavor = None;
  let mut repeat = None;

  for meta in args {
    match &meta {
      Meta::Path(path) if path.is_ident("local") => flavor = Some(quote!(flavor = "current_thread")),
      Meta::Path(path) if path.is_ident("shared") => {
        flavor = Some(quote!(flavor = "multi_thread", worker_threads = 4))
      }
      Meta::NameValue(nv) if nv.path.is_ident("repeat") => match &nv.value {
        Expr::Lit(ExprLit { lit: Lit::Int(n), .. }) => repeat = Some(n.clone()),
        other => {
          return syn::Error::new(other.span(), "`repeat` expects an integer literal")
            .to_compile_error()
            .into();
        }
      },
      other => {
        return syn::Error::new(
          other.span(),
          "rxsingle_macro::test accepts: `local`, `shared`, or `repeat = N`",
        )
        .to_compile_error()
        .into();
      }
    }
  }

  if flavor.is_some() && !is_async {
    return syn::Error::new(
      input.sig.span(),
      "`local` / `shared` flavors are only supported for async tests",
    )
    .to_compile_error()
    .into();
  }

  if repeat.is_some() && !matches!(input.sig.output, ReturnType::Default) {
    return syn::Error::new(input.sig.output.span(), "`repeat` tests must return `()`")
      .to_compile_error()
      .into();
  }

  let ItemFn { attrs, vis, sig, block } = input;
  let body = match (&repeat, is_async) {
    (Some(n), false) => quote!({
      let mut body = || #block;
      for _ in 0..#n {
        body();
      }
    }),
    (Some(n), true) => quote!({
      for _ in 0..#n {
        async #block.await;
      }
    }),
    (None, _) => quote!(#block),
  };

  let test_attr = if is_async {
    match flavor {
      Some(flavor) => quote!(#[tokio::test(#flavor)]),
      None => quote!(#[tokio::test]),
    }
  } else {
    quote!(#[test])
  };

  let expanded = quote! {
    #test_attr
    #(#attrs)*
    #vis #sig #body
  };

  TokenStream::from(expanded)
}
